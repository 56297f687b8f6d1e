//! # geosort
//!
//! A command-line tool that sorts photos and videos into dated,
//! location-named folders.
//!
//! Each file's capture time and GPS position are read (through `exiftool`
//! when installed, the built-in EXIF reader otherwise). The position is
//! rounded to a configurable precision and resolved to a place name, asking
//! a reverse geocoding service only when the rounded position is not already
//! in the local cache. The file is then moved into
//! `<YYYY-MM-DD> <place>/` next to where it was.
//!
//! ## Features
//!
//! - Three geocoding providers: Nominatim, OpenCage and LocationIQ
//! - Persistent JSON cache of resolved names, including "nothing here" answers
//! - User aliases that rewrite resolved place names
//! - Request throttling and rate-limit retries
//! - Dry runs that print the plan without moving anything

// Export modules for integration testing
pub mod alias;
pub mod cache;
pub mod config;
pub mod error;
pub mod exif;
pub mod geocode;
pub mod location;
pub mod metadata;
pub mod organize;
pub mod resolver;
pub mod sort;
