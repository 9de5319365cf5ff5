//! Build planning core: allocation state, allocation rules, reducer, and the
//! share-token codec. State lives in WASM memory (thread_local) for the
//! lifetime of the Web Worker; node states are never cached, every query
//! recomputes them from the current allocation.

pub mod codec;
pub mod logic;
pub mod reducer;
pub mod render;
pub mod state;
