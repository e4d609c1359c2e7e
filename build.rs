const SHADER_DIR: &str = "assets/shaders";

/// Compiles each glsl source in the shader directory to `<source>_<stage>.spv` where stage is 0 for
/// vertex and 1 for fragment shaders. The renderer loads these at run-time.
#[cfg(feature = "shader-compile")]
fn gen_shader_spirv() {
    use std::{fs, path::PathBuf};

    let compiler = shaderc::Compiler::new().expect("failed to initialize shaderc compiler");
    let mut options =
        shaderc::CompileOptions::new().expect("failed to initialize shaderc compile options");
    options.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_3 as u32,
    );
    options.set_target_spirv(shaderc::SpirvVersion::V1_0);

    for dir_entry in fs::read_dir(SHADER_DIR).expect("invalid shader source path") {
        let dir_entry = dir_entry.expect("fs::ReadDir io error during iteration");
        let shader_path = dir_entry.path();

        // file name (skips if it contains invalid utf-8)
        let file_name = match dir_entry.file_name().into_string() {
            Ok(s) => s,
            Err(_) => continue,
        };

        let (shader_kind, stage_index) = match shader_path.extension().and_then(|e| e.to_str()) {
            Some("vert") => (shaderc::ShaderKind::Vertex, 0u8),
            Some("frag") => (shaderc::ShaderKind::Fragment, 1u8),
            _ => continue,
        };

        println!("Compiling {:?}...", file_name);

        let shader_text =
            fs::read_to_string(&shader_path).expect("invalid utf-8 in shader source code");

        let spirv_comp = compiler
            .compile_into_spirv(&shader_text, shader_kind, &file_name, "main", Some(&options))
            .unwrap_or_else(|e| panic!("failed to compile shader {:?}: {}", shader_path, e));

        let spirv_path = PathBuf::from(format!("{}_{}.spv", shader_path.display(), stage_index));
        fs::write(&spirv_path, spirv_comp.as_binary_u8())
            .unwrap_or_else(|e| panic!("failed to write spirv file {:?}: {}", spirv_path, e));
    }
}

fn main() {
    #[cfg(feature = "shader-compile")]
    gen_shader_spirv();

    // rerun when shader sources change. the spirv outputs share the directory so aren't tracked.
    let Ok(dir_entries) = std::fs::read_dir(SHADER_DIR) else {
        return;
    };
    for shader_path in dir_entries.flatten().map(|e| e.path()) {
        if matches!(
            shader_path.extension().and_then(|e| e.to_str()),
            Some("vert" | "frag")
        ) {
            println!("cargo:rerun-if-changed={}", shader_path.display());
        }
    }
}
