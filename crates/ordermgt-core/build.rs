/// Builds the gRPC client and server code for the `ordermgt.proto` definition
/// using `tonic-prost-build`.
///
/// The generated module lives in the crate's `OUT_DIR` together with an
/// encoded file descriptor set, which the server registers with the
/// reflection service.
///
/// # Files and Paths
///
/// - Proto file: `proto/ordermgt.proto`
/// - Includes: `proto/`
///
/// # Output
///
/// ```rust
/// pub mod proto {
///     tonic::include_proto!("ecommerce");
/// }
/// ```
use std::env;
use std::path::PathBuf;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("ordermgt_descriptor.bin");

    println!("cargo:rerun-if-changed=proto/ordermgt.proto");

    let mut config = tonic_prost_build::Config::new();
    config.file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/ordermgt.proto"], &["proto"])
        .unwrap();
}
