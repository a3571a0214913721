//! Pipeline stages for batch processing of scanned scripts.
//!
//! ## Data Flow
//!
//! ```text
//! scan ──▶ job ──▶ overlay ──────────────▶ <stem>-<spread>.pdf
//!  (dir)  (paths)  └─▶ export ─▶ descriptor ─▶ <stem>/ + <stem>.xml
//! ```
//!
//! 1. [`scan`]: list the scripts in the input folder and, for
//!    exports, find the longest one
//! 2. [`job`]: fix every path one script will read or write
//! 3. [`overlay`]: extract, rasterise, render and merge one script
//! 4. [`export`]: rasterise one script into its own folder and write
//!    its descriptor
//! 5. [`descriptor`]: the descriptor's XML model

pub mod descriptor;
pub mod export;
pub mod job;
pub mod overlay;
pub mod scan;
