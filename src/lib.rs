#![doc = include_str!("../README.md")]
#![warn(rustdoc::all)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

pub mod error;

pub mod span;

pub mod value;

pub mod ast;

pub mod parser;

pub mod convert;

pub mod merge;

pub mod discover;

mod cycle;

pub mod import;

pub mod validate;

pub mod provider;

pub mod resolve;

pub mod diagnostic;

pub mod snapshot;

mod compile;
pub use compile::{compile, render, CompileOptions, CompileOptionsBuilder, VARIABLES_ALIAS};

pub mod utils;

/// Scratch-directory helpers for building throwaway `.csl` trees in tests,
/// the way the teacher's `project_util` builds scratch Solidity projects.
#[cfg(feature = "project-util")]
pub mod project_util;
