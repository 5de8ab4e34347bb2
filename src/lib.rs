//! `skirmish` - round and turn orchestration for turn-based tactics matches
//!
//! The [`round::RoundController`] sequences game, round, and turn phases
//! over a [`roster::UnitRegistry`]; the [`round::MatchRunner`] drives it on
//! a tokio task. Configuration, logging, events, and metrics live in
//! [`config`] and [`observability`].

pub mod cli;
pub mod config;
pub mod error;
pub mod observability;
pub mod roster;
pub mod round;
