use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=proto/docksphinx.proto");

    let protoc = protoc_bin_vendored::protoc_bin_path()
        .map_err(|e| format!("failed to locate vendored protoc: {e}"))?;
    let well_known = protoc_bin_vendored::include_path()
        .map_err(|e| format!("failed to locate vendored protobuf includes: {e}"))?;
    // SAFETY: the build script is single-threaded, nothing else reads the environment concurrently.
    unsafe { std::env::set_var("PROTOC", protoc) };

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &[PathBuf::from("proto/docksphinx.proto")],
            &[PathBuf::from("proto"), well_known],
        )?;

    Ok(())
}
