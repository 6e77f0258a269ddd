use std::env;
use std::path::PathBuf;

fn main() {
	let crate_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
	let out_dir: PathBuf = [crate_dir.as_str(), "include"].iter().collect();
	let _ = std::fs::create_dir_all(&out_dir);

	let config = cbindgen::Config::from_file(
		PathBuf::from(&crate_dir).join("cbindgen.toml")
	).unwrap_or_default();

	if let Ok(bindings) = cbindgen::Builder::new()
		.with_crate(&crate_dir)
		.with_config(config)
		.generate()
	{
		bindings.write_to_file(out_dir.join("skizo.h"));
	}

	println!("cargo:rerun-if-changed=src");
}
