use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = prost_build::Config::new();

    // Fall back to the vendored protoc when none is configured
    if std::env::var_os("PROTOC").is_none() {
        config.protoc_executable(protoc_bin_vendored::protoc_bin_path()?);
    }

    let includes = [
        PathBuf::from("proto"),
        protoc_bin_vendored::include_path()?,
    ];

    // The server half is only used by the in-process test device
    tonic_build::configure().compile_protos_with_config(
        config,
        &["proto/gnmi.proto"],
        &includes,
    )?;

    println!("cargo:rerun-if-changed=proto/gnmi.proto");
    Ok(())
}
