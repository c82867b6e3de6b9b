//! Client-side session management for Spotify Connect playback.
//!
//! This crate keeps a host application synchronized with a remote playback
//! device controlled through the Spotify Web API and an external playback
//! SDK. It handles:
//! * Bearer credential lifecycle with scheduled refresh ([`auth`])
//! * Playback device registration and recovery ([`device`])
//! * Reconciliation of event-driven and polled playback state ([`state`])
//! * Debounced seek and volume commands ([`control`])
//! * Track display metadata with stale-result suppression ([`metadata`])
//!
//! [`session::Session`] owns and wires all of the above.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod auth;
pub mod config;
pub mod control;
pub mod device;
pub mod error;
pub mod events;
pub mod http;
pub mod metadata;
pub mod protocol;
pub mod sdk;
pub mod session;
pub mod state;
pub mod tokens;
pub mod web;
