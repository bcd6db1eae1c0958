//! `lingo`: a line-oriented, natural-language scripting engine.
//!
//! | Module      | Role                                                        |
//! |-------------|-------------------------------------------------------------|
//! | [`pattern`] | template grammar: `[optional]`, `(a\|b)`, `<regex>`, `%type%` |
//! | [`types`]   | semantic types, literal parsers and converters              |
//! | [`var`]     | global and local variable stores                            |
//! | [`script`]  | nodes, dispatcher, sections and the execution driver        |
//! | [`event`]   | event declarations and trigger headers                      |
//! | [`trigger`] | loaded scripts, event and command dispatch                  |
//! | [`engine`]  | registration phase and the frozen engine                    |
//! | [`config`]  | `lingo.toml`                                                |
//! | [`cli`]     | command-line arguments of the `lingo` binary                |
//! | [`error`]   | error types                                                 |

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod pattern;
pub mod script;
pub mod trigger;
pub mod types;
pub mod var;
