//! Build script for selfprog-firmware
//!
//! - Validates target.toml at compile time
//! - Generates the geometry constants included by main.rs
//! - Reminds about the SELFPROGEN fuse

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=SELFPROG_DISABLE_FUSE_WARNING");

    let target = load_target();
    write_geometry(&target);

    if env::var_os("SELFPROG_DISABLE_FUSE_WARNING").is_none() {
        println!("cargo:warning=Reminder: the SELFPROGEN fuse must be programmed for self-programming to work");
    }
}

/// Validated target settings
struct Target {
    memmap_start: u16,
    flash_size: u16,
    page_size: u16,
    reserved_pages: u16,
    led_pin: String,
    cpu_hz: u32,
}

/// Load and validate target.toml
fn load_target() -> Target {
    println!("cargo:rerun-if-changed=target.toml");

    let path = Path::new("target.toml");
    if !path.exists() {
        fail("target.toml not found", &["The firmware needs the flash geometry of the part."]);
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => fail("Failed to read target.toml", &[&e.to_string()]),
    };

    let config: toml::Value = match toml::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            let msg = e.to_string();
            let lines: Vec<&str> = msg.lines().collect();
            fail("Invalid TOML syntax in target.toml", &lines)
        }
    };

    let mut errors = Vec::new();

    let memmap_start = get_u16(&config, "flash", "memmap_start", &mut errors);
    let flash_size = get_u16(&config, "flash", "size", &mut errors);
    let page_size = get_u16(&config, "flash", "page_size", &mut errors);
    let reserved_pages = get_u16(&config, "flash", "reserved_pages", &mut errors);

    let led_pin = match config.get("board").and_then(|b| b.get("led_pin")) {
        Some(toml::Value::String(pin)) => pin.clone(),
        _ => {
            errors.push("[board] missing 'led_pin'".to_string());
            String::new()
        }
    };
    let cpu_hz = match config.get("board").and_then(|b| b.get("cpu_hz")) {
        Some(toml::Value::Integer(hz)) if *hz > 0 && *hz <= u32::MAX as i64 => *hz as u32,
        Some(_) => {
            errors.push("[board] cpu_hz must be a positive 32-bit integer".to_string());
            0
        }
        None => {
            errors.push("[board] missing 'cpu_hz'".to_string());
            0
        }
    };

    if errors.is_empty() {
        validate_geometry(memmap_start, flash_size, page_size, reserved_pages, &mut errors);
        validate_pin(&led_pin, &mut errors);
    }

    if !errors.is_empty() {
        let lines: Vec<&str> = errors.iter().map(String::as_str).collect();
        fail("Invalid configuration in target.toml", &lines);
    }

    Target {
        memmap_start,
        flash_size,
        page_size,
        reserved_pages,
        led_pin,
        cpu_hz,
    }
}

/// Read an integer field that must fit in 16 bits
fn get_u16(config: &toml::Value, section: &str, key: &str, errors: &mut Vec<String>) -> u16 {
    match config.get(section).and_then(|s| s.get(key)) {
        Some(toml::Value::Integer(v)) if (0..=u16::MAX as i64).contains(v) => *v as u16,
        Some(_) => {
            errors.push(format!("[{}] {} must be an integer 0-65535", section, key));
            0
        }
        None => {
            errors.push(format!("[{}] missing '{}'", section, key));
            0
        }
    }
}

/// Same rules as FlashGeometry::validate and ReservedBlock::at_end
fn validate_geometry(memmap_start: u16, flash_size: u16, page_size: u16, reserved_pages: u16, errors: &mut Vec<String>) {
    if page_size < 2 || !page_size.is_power_of_two() {
        errors.push("[flash] page_size must be a power of two, at least 2".to_string());
        return;
    }
    if flash_size == 0 || flash_size % page_size != 0 {
        errors.push("[flash] size must be a non-zero multiple of page_size".to_string());
        return;
    }
    if memmap_start % page_size != 0 {
        errors.push("[flash] memmap_start must be page aligned".to_string());
    }
    if memmap_start as u32 + flash_size as u32 > 0x1_0000 {
        errors.push("[flash] memmap_start + size overflows the data space".to_string());
    }
    if reserved_pages == 0 || reserved_pages > flash_size / page_size {
        errors.push(format!(
            "[flash] reserved_pages must be 1-{}",
            flash_size / page_size
        ));
    }
}

/// Pin names: PA0-PA7, PB0-PB3, optional "!" prefix
fn validate_pin(pin: &str, errors: &mut Vec<String>) {
    let name = pin.trim().trim_start_matches('!').to_ascii_uppercase();
    let valid = match name.as_bytes() {
        [b'P', b'A', n] => (b'0'..=b'7').contains(n),
        [b'P', b'B', n] => (b'0'..=b'3').contains(n),
        _ => false,
    };
    if !valid {
        errors.push(format!("[board] led_pin '{}' must be PA0-PA7 or PB0-PB3", pin));
    }
}

/// Write OUT_DIR/geometry.rs
fn write_geometry(target: &Target) {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let source = format!(
        "// Generated from target.toml by build.rs\n\
         pub const MEMMAP_FLASH_START: u16 = {:#06x};\n\
         pub const FLASH_SIZE: u16 = {};\n\
         pub const PAGE_SIZE: u16 = {};\n\
         pub const RESERVED_PAGES: u16 = {};\n\
         pub const LED_PIN: &str = {:?};\n\
         pub const CPU_HZ: u32 = {};\n",
        target.memmap_start,
        target.flash_size,
        target.page_size,
        target.reserved_pages,
        target.led_pin,
        target.cpu_hz,
    );
    fs::write(out_dir.join("geometry.rs"), source).unwrap();
}

/// Abort the build with a boxed error message
fn fail(title: &str, lines: &[&str]) -> ! {
    panic!(
        "\n\
        ╔══════════════════════════════════════════════════════════════════╗\n\
        ║  ERROR: {:<56} ║\n\
        ╠══════════════════════════════════════════════════════════════════╣\n\
        {}\n\
        ╚══════════════════════════════════════════════════════════════════╝\n",
        title,
        format_error_lines(lines)
    );
}

/// Format error message lines with box drawing
fn format_error_lines(lines: &[&str]) -> String {
    lines
        .iter()
        .map(|line| {
            let truncated = if line.len() > 62 {
                format!("{}...", &line[..59])
            } else {
                line.to_string()
            };
            format!("║  • {:<62} ║", truncated)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
