fn main() {
    if std::env::var("CARGO_FEATURE_GRPC").is_err() {
        return;
    }

    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        .compile_protos(&["proto/a2a.proto"], &["proto"])
        .expect("failed to compile proto/a2a.proto");
}
