//! Lambda Gateway Workspace - end-to-end tests for the local API Gateway emulator.
//!
//! This is a virtual package that provides workspace-level integration tests.
//! The actual functionality lives in the `lambda-gateway` member crate, which
//! provides the HTTP front door, the invocation queue and worker slot, the
//! runtime control surface and the Lambda Runtime API.
