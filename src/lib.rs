// SYNOID Timeline Library
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Segment selection, the two-clock edit compiler and the encoder-backed
// export path.

pub mod agent;
pub mod config;
pub mod error;
pub mod render;
pub mod timeline;
