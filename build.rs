use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Fixed block header size. Part of the binary layout contract, so it is not
/// read from the config file.
const HEADER_SIZE: usize = 32;

#[derive(Deserialize, Default)]
struct ConfigSection {
    fallback_page_size: Option<usize>,
    min_payload: Option<usize>,
    alignment: Option<usize>,
    magic: Option<u32>,
    corruption_policy: Option<String>,
}

#[derive(Deserialize, Default)]
struct Config {
    #[serde(default)]
    config: ConfigSection,
}

struct ResolvedConfig {
    fallback_page_size: usize,
    min_payload: usize,
    alignment: usize,
    magic: u32,
    strict: bool,
}

fn resolve_config(cfg: &ConfigSection) -> ResolvedConfig {
    let fallback_page_size = cfg.fallback_page_size.unwrap_or(4096);
    assert!(
        fallback_page_size > 0 && fallback_page_size.is_power_of_two(),
        "fallback_page_size ({}) must be a power of 2",
        fallback_page_size
    );
    assert!(
        fallback_page_size >= 4096,
        "fallback_page_size ({}) must be >= 4096",
        fallback_page_size
    );

    let alignment = cfg.alignment.unwrap_or(8);
    assert!(
        alignment.is_power_of_two(),
        "alignment ({}) must be a power of 2",
        alignment
    );
    assert!(
        alignment >= 8,
        "alignment ({}) must be at least 8: user pointers are 8-byte aligned and headers hold pointers",
        alignment
    );
    assert!(
        HEADER_SIZE % alignment == 0,
        "alignment ({}) must divide the header size ({})",
        alignment,
        HEADER_SIZE
    );

    let min_payload = cfg.min_payload.unwrap_or(16);
    assert!(min_payload > 0, "min_payload must be > 0");
    assert!(
        min_payload % alignment == 0,
        "min_payload ({}) must be a multiple of alignment ({})",
        min_payload,
        alignment
    );
    assert!(
        HEADER_SIZE * 2 + min_payload <= fallback_page_size,
        "min_payload ({}) does not fit in a page",
        min_payload
    );

    let magic = cfg.magic.unwrap_or(0xB10C_4EAD);
    assert!(magic != 0, "magic must be non-zero");

    let strict = match cfg.corruption_policy.as_deref().unwrap_or("lenient") {
        "lenient" => false,
        "strict" => true,
        other => panic!(
            "corruption_policy ({}) must be \"lenient\" or \"strict\"",
            other
        ),
    };

    ResolvedConfig {
        fallback_page_size,
        min_payload,
        alignment,
        magic,
        strict,
    }
}

fn default_config_path() -> String {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    format!("{}/blockheap.toml", manifest_dir)
}

fn generate_config(cfg: &ResolvedConfig, out_path: &Path) {
    let policy = if cfg.strict { "Strict" } else { "Lenient" };
    let code = format!(
        "// Auto-generated by build.rs. Do not edit.\n\n\
         pub const FALLBACK_PAGE_SIZE: usize = {};\n\
         pub const MIN_PAYLOAD: usize = {};\n\
         pub const ALIGNMENT: usize = {};\n\
         pub const HEADER_MAGIC: u32 = {:#x};\n\
         pub const DEFAULT_POLICY: crate::heap::CorruptionPolicy = crate::heap::CorruptionPolicy::{};\n",
        cfg.fallback_page_size, cfg.min_payload, cfg.alignment, cfg.magic, policy,
    );
    fs::write(out_path, code).expect("failed to write config_gen.rs");
}

fn main() {
    println!("cargo:rerun-if-env-changed=BLOCKHEAP_CONFIG");

    let out_dir = env::var("OUT_DIR").unwrap();

    let config_path = env::var("BLOCKHEAP_CONFIG").unwrap_or_else(|_| default_config_path());
    println!("cargo:rerun-if-changed={}", config_path);
    let content = fs::read_to_string(&config_path)
        .unwrap_or_else(|e| panic!("failed to read {}: {}", config_path, e));

    let config: Config = toml::from_str(&content).expect("failed to parse TOML config");

    let resolved = resolve_config(&config.config);

    generate_config(&resolved, &Path::new(&out_dir).join("config_gen.rs"));
}
