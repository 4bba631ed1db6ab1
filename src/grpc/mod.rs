//! gRPC transport binding (`tonic`/`prost`), gated under the `grpc` feature.
//!
//! Exposes the same operation set as the JSON-RPC and REST bindings, projected
//! onto the `A2AService` defined in `proto/a2a.proto` — unary RPCs for
//! `send_message`/`get_task`/`cancel_task`/push-notification-config CRUD,
//! server-streaming RPCs for `send_message_stream`/`subscribe`/`resubscribe`.
//!
//! `pb` holds the `tonic_build`-generated client/server stubs and message
//! types; `convert` maps those onto this crate's `types.rs` structs; `client`
//! and `server` wire the generated stubs into the same `Transport` and
//! `RequestHandler` traits the other two bindings already implement, so
//! `A2AClient` and `DefaultRequestHandler` work unmodified over gRPC.

pub mod pb {
    #![allow(clippy::all)]
    tonic::include_proto!("a2a");
}

pub mod client;
pub mod convert;
pub mod server;

pub use client::GrpcTransport;
pub use server::A2AGrpcService;
