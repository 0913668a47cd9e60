use std::fs;
use std::path::Path;
use std::process::Command;

fn main() {
    // Capture Git values during compilation (not at runtime)
    let git_hash = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let git_date = Command::new("git")
        .args(["log", "-1", "--format=%ci"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    // Embed these values as constants in the binary
    println!("cargo:rustc-env=GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=GIT_DATE={}", git_date);

    // Shaders are only needed by the Vulkan device
    if std::env::var_os("CARGO_FEATURE_VULKAN").is_some() {
        compile_shaders();
    }
}

fn compile_shaders() {
    println!("cargo:rerun-if-changed=shaders/");

    let out_dir = std::env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    let shader_out_dir = Path::new(&out_dir).join("shaders");
    fs::create_dir_all(&shader_out_dir).expect("Failed to create shader output dir");

    for name in ["trace", "tonemap"] {
        compile_shader(
            &format!("shaders/{}.comp", name),
            &shader_out_dir.join(format!("{}.spv", name)).to_string_lossy(),
        );
    }
}

fn compile_shader(input: &str, output: &str) {
    if !Path::new(input).exists() {
        panic!("Shader source file not found: {}", input);
    }

    let result = Command::new("glslc")
        .arg("-fshader-stage=compute")
        .arg("-O")
        .arg("--target-env=vulkan1.2")
        .arg(input)
        .arg("-o")
        .arg(output)
        .status()
        .expect("Failed to execute glslc. Make sure it's installed and in PATH.");

    if !result.success() {
        panic!("Shader compilation failed for {}", input);
    }
    if !Path::new(output).exists() {
        panic!("Expected output file not created: {}", output);
    }
}
