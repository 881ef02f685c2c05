// This file is part of h5cloud-testkit.
//
// Test-only support crate: synthetic HDF5 byte-buffer construction and a
// mock byte source, split out the same way the teacher crate keeps its own
// ad-hoc test-input helpers in a separate `util` crate rather than inline in
// `#[cfg(test)]` blocks, so integration tests in `h5cloud` and unit tests
// colocated with library modules can both reach for the same builders.

pub mod body;
pub mod buf;
pub mod mock_source;
pub mod writer;
