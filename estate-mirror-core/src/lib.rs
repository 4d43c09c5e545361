#![doc = "estate-mirror-core: the mirror synchronisation pipeline behind estate-mirror."]

//! Mirrors a whole workspace → project → repository estate from Bitbucket
//! Cloud to GitHub through local bare mirrors.
//!
//! The pipeline pieces live in their own modules and are wired together by
//! [`synchronise`]. The CLI crate only loads configuration and picks an
//! entrypoint.
//!
//! # Usage
//! Build a [`sync::SyncExecutor`] and/or a [`provision::Provisioner`] around
//! a [`mirror_store::MirrorStore`], a [`git::SystemGit`] and the HTTP clients
//! in [`bitbucket`] and [`destination`], then call one of the entrypoints in
//! [`synchronise`].

pub mod bitbucket;
pub mod config;
pub mod contract;
pub mod destination;
pub mod enumerate;
pub mod error;
pub mod failure_log;
pub mod git;
pub mod mirror_store;
pub mod provision;
pub mod scheduler;
pub mod sizes;
pub mod sync;
pub mod synchronise;
