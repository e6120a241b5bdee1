// generate C header when capi feature is enabled

fn main() {
    #[cfg(feature = "capi")]
    {
        generate_c_header();
    }
}

#[cfg(feature = "capi")]
fn generate_c_header() {
    use std::env;
    use std::path::PathBuf;

    let crate_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let output_file = PathBuf::from(&crate_dir).join("hdfs_vfs.h");

    println!("cargo:rerun-if-changed=src/ffi.rs");
    println!("cargo:rerun-if-changed=src/core.rs");

    cbindgen::Builder::new()
        .with_crate(crate_dir)
        .with_language(cbindgen::Language::C)
        .with_include_guard("HDFS_VFS_H")
        .with_pragma_once(true)
        .with_documentation(true)
        .with_parse_deps(true)
        .with_parse_include(&["libc"])
        .rename_item("HdfsVfsErrorCode", "hdfs_vfs_error_code_t")
        .rename_item("HdfsVfsFilesystem", "hdfs_vfs_filesystem_t")
        .rename_item("HdfsVfsFile", "hdfs_vfs_file_t")
        .with_header(
            "/**\n\
             * hdfs-vfs C API\n\
             * \n\
             * Read-only access to files behind a WebHDFS gateway.\n\
             * \n\
             * Basic usage:\n\
             * \n\
             *     hdfs_vfs_file_t* file = hdfs_vfs_open_url(\"hdfs://namenode:9870/data/a.parquet\", \"r\");\n\
             *     if (!file) {\n\
             *         fprintf(stderr, \"Error: %s\\n\", hdfs_vfs_last_error());\n\
             *         return 1;\n\
             *     }\n\
             *     \n\
             *     char buffer[1024];\n\
             *     ssize_t n = hdfs_vfs_read_at(file, buffer, sizeof(buffer), 0);\n\
             *     \n\
             *     hdfs_vfs_file_close(file);\n\
             * \n\
             * Error reporting is thread-local.\n\
             * Filesystem handles can be shared between threads.\n\
             * File handles must not be used from multiple threads simultaneously.\n\
             */",
        )
        .with_after_include(
            "#include <stdint.h>\n\
             #include <stddef.h>\n\
             \n\
             #ifdef _WIN32\n\
             typedef intptr_t ssize_t;\n\
             #else\n\
             #include <sys/types.h>\n\
             #endif\n\
             \n\
             #ifdef __cplusplus\n\
             extern \"C\" {\n\
             #endif",
        )
        .with_trailer(
            "#ifdef __cplusplus\n\
             }\n\
             #endif",
        )
        .generate()
        .expect("Unable to generate C bindings")
        .write_to_file(&output_file);

    println!("cargo:warning=Generated C header: {}", output_file.display());
}
