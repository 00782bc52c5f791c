//! Pipeline stages for multi-section document assembly.
//!
//! Each submodule implements exactly one step, so each is testable alone and
//! the two external collaborators (template engine, PDF converter) can be
//! swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//!                 ┌─▶ coordinator ─▶ render ─▶ template + converter ─┐
//! section ──▶ plan│    (worker pool)  (per section)                   ├─▶ merge ─▶ encode
//!                 └─▶ static_loader ─────────────────────────────────┘
//! ```
//!
//! 1. [`section`]  - list the folder, classify files, compute the merge order
//! 2. [`context`]  - the read-only data + image view shared by all renderers
//! 3. [`coordinator`] - run dynamic sections on a bounded worker pool
//! 4. [`render`]   - one section: read template, fill it, convert it
//! 5. [`template`] - fill a `.docx` package; runs in `spawn_blocking`
//! 6. [`converter`] - `.docx` to PDF over HTTP; the only network I/O
//! 7. [`static_loader`] - read pre-rendered PDFs, concurrently with step 3
//! 8. [`merge`]    - concatenate in order, or fall back to one section
//! 9. [`encode`]   - Base64 for the JSON response

pub mod context;
pub mod converter;
pub mod coordinator;
pub mod encode;
pub mod merge;
pub mod render;
pub mod section;
pub mod static_loader;
pub mod template;
