//! Generated gRPC types and service stubs for the Peer and Registry
//! surfaces, compiled from `proto/quorum.proto` by `build.rs`.

tonic::include_proto!("quorum");
