//! Movement signals: how a line asks the driver to leave linear order.

use std::fmt;

/// Kind of an enclosing section, as far as unwinding is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// `if` / `else if` / `else` bodies.
    Conditional,
    /// `while` and `loop` bodies.
    Loop,
}

/// Which enclosing sections an exit counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// Any section.
    Section,
    Loop,
    Conditional,
    /// Straight out of the trigger.
    Everything,
}

impl ExitKind {
    /// Does leaving a section of `kind` count against the exit's count?
    pub fn counts(self, kind: SectionKind) -> bool {
        match self {
            ExitKind::Section | ExitKind::Everything => true,
            ExitKind::Loop => kind == SectionKind::Loop,
            ExitKind::Conditional => kind == SectionKind::Conditional,
        }
    }

    /// Enclosing sections of this kind, given the parse-time section stack.
    pub fn available(self, sections: &[SectionKind]) -> usize {
        sections.iter().filter(|k| self.counts(**k)).count()
    }
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExitKind::Section => "section",
            ExitKind::Loop => "loop",
            ExitKind::Conditional => "conditional",
            ExitKind::Everything => "everything",
        })
    }
}

/// Request to move the instruction pointer somewhere other than the next line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    /// Skip the rest of the innermost loop body and start its next iteration.
    ContinueNearestLoop,
    /// Leave `count` enclosing sections of `kind`.
    ExitSections { kind: ExitKind, count: usize },
}

impl Movement {
    /// Plain `exit`: the innermost section, or everything at trigger level.
    pub fn default_exit(sections: &[SectionKind]) -> Movement {
        if sections.is_empty() {
            Movement::ExitSections { kind: ExitKind::Everything, count: 1 }
        } else {
            Movement::ExitSections { kind: ExitKind::Section, count: 1 }
        }
    }

    pub fn everything() -> Movement {
        Movement::ExitSections { kind: ExitKind::Everything, count: 1 }
    }
}

/// What running one line produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Go on with the next line.
    Continue,
    /// A bare condition failed; stop the invocation quietly.
    Halt,
    Move(Movement),
}
