fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/");

    tonic_build::configure()
        .build_server(true)
        // The client is used by the end-to-end tests
        .build_client(true)
        .btree_map(["."])
        .compile_protos(&["proto/gnmi.proto"], &["proto/", "/usr/include"])?;
    Ok(())
}
