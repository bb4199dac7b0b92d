//! # Symbolic Evaluation
//! 
//! The crate defines a generic symbolic execution algorithm parametrized by
//! 
//! - a transition system, which defines the dynamic of the language;
//! 
//! - a similar relation defined on the states of the transition system, and
//! a merge operator defined on similar states, which together defines the
//! merge strategy;
//! 
//! - a `pick_next` method, which defines the search strategy;
//!
//! - a `keep_going` predicate, polled before each step, which bounds the
//! exploration (e.g. by a wall-clock deadline).

pub mod traits;
pub mod evaluation;
