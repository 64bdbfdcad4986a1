pub mod alerts;
pub mod audit;
pub mod cache;
pub mod config;
pub mod cross_day;
pub mod day;
pub mod entries;
pub mod guard;
pub mod hasher;
pub mod hints;
pub mod legacy;
pub mod local_store;
pub mod merge;
pub mod model;
pub mod notes;
pub mod overrides;
pub mod paths;
pub mod remote;
pub mod report;
pub mod schedule;
pub mod session;
pub mod state;
pub mod util;
