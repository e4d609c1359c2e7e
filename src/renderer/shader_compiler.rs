//! Loads SPIR-V for the renderer's shaders, compiling GLSL sources with shaderc when the
//! `shader-compile` feature is enabled. Compiled binaries are cached next to their source as
//! `<source>_<stage>.spv`.

use super::config_renderer::{
    OVERLAY_SHADER_NAME, SCENE_SHADER_NAME, SHADER_DIR, SHADER_ENTRY_POINT,
};
use anyhow::Context;
use ash::vk;
use bort_vk::{Device, ShaderModule, ShaderStage};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use std::{
    ffi::CString,
    fmt::{self, Display},
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

pub const SPIRV_MAGIC_NUMBER: u32 = 0x0723_0203;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ShaderStageKind {
    Vertex = 0,
    Fragment = 1,
}

impl ShaderStageKind {
    pub fn vk_flags(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    pub fn file_extension(self) -> &'static str {
        match self {
            Self::Vertex => "vert",
            Self::Fragment => "frag",
        }
    }

    #[cfg(feature = "shader-compile")]
    pub fn shaderc_kind(self) -> shaderc::ShaderKind {
        match self {
            Self::Vertex => shaderc::ShaderKind::Vertex,
            Self::Fragment => shaderc::ShaderKind::Fragment,
        }
    }
}

/// `assets/shaders/<name>.<vert|frag>`
pub fn shader_source_path(name: &str, stage: ShaderStageKind) -> PathBuf {
    Path::new(SHADER_DIR).join(format!("{}.{}", name, stage.file_extension()))
}

pub fn spirv_cache_path(source_path: impl AsRef<Path>, stage: ShaderStageKind) -> PathBuf {
    PathBuf::from(format!(
        "{}_{}.spv",
        source_path.as_ref().display(),
        stage as u8
    ))
}

pub fn load_spirv(path: impl AsRef<Path>) -> Result<Vec<u32>, ShaderCompilerError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ShaderCompilerError::NotFound(path.to_path_buf()),
        _ => ShaderCompilerError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        },
    })?;
    spirv_from_bytes(&bytes, path)
}

/// Checks the length and magic number and converts to words
pub fn spirv_from_bytes(bytes: &[u8], path: &Path) -> Result<Vec<u32>, ShaderCompilerError> {
    if bytes.is_empty() {
        return Err(ShaderCompilerError::Empty(path.to_path_buf()));
    }
    if bytes.len() % 4 != 0 {
        return Err(ShaderCompilerError::InvalidSpirv {
            path: path.to_path_buf(),
            reason: format!("length {} is not a multiple of 4", bytes.len()),
        });
    }

    let words = bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect::<Vec<_>>();

    if words[0] != SPIRV_MAGIC_NUMBER {
        return Err(ShaderCompilerError::InvalidSpirv {
            path: path.to_path_buf(),
            reason: format!("bad magic number {:#010x}", words[0]),
        });
    }
    Ok(words)
}

/// Compiles a `#version 450` GLSL source for Vulkan 1.3 and writes the SPIR-V cache file
#[cfg(feature = "shader-compile")]
pub fn compile(
    source_path: impl AsRef<Path>,
    stage: ShaderStageKind,
) -> Result<Vec<u32>, ShaderCompilerError> {
    let source_path = source_path.as_ref();
    let source = std::fs::read_to_string(source_path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ShaderCompilerError::NotFound(source_path.to_path_buf()),
        _ => ShaderCompilerError::Io {
            path: source_path.to_path_buf(),
            error: e.to_string(),
        },
    })?;
    check_glsl_version(&source, source_path)?;

    let compiler = shaderc::Compiler::new().ok_or(ShaderCompilerError::CompilerInit)?;
    let mut options = shaderc::CompileOptions::new().ok_or(ShaderCompilerError::CompilerInit)?;
    options.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_3 as u32,
    );
    options.set_target_spirv(shaderc::SpirvVersion::V1_0);
    options.set_source_language(shaderc::SourceLanguage::GLSL);

    let file_name = source_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let artifact = compiler
        .compile_into_spirv(
            &source,
            stage.shaderc_kind(),
            &file_name,
            SHADER_ENTRY_POINT,
            Some(&options),
        )
        .map_err(|e| ShaderCompilerError::Compilation {
            path: source_path.to_path_buf(),
            log: e.to_string(),
        })?;
    if artifact.get_num_warnings() > 0 {
        warn!(
            "shader {:?} compiled with warnings:\n{}",
            source_path,
            artifact.get_warning_messages()
        );
    }

    let cache_path = spirv_cache_path(source_path, stage);
    let bytes = artifact.as_binary_u8();
    if cfg!(debug_assertions) {
        spirv_from_bytes(bytes, &cache_path)?;
    }
    std::fs::write(&cache_path, bytes).map_err(|e| ShaderCompilerError::Io {
        path: cache_path.clone(),
        error: e.to_string(),
    })?;
    debug!("compiled {:?} to {:?}", source_path, cache_path);

    Ok(artifact.as_binary().to_vec())
}

#[cfg(not(feature = "shader-compile"))]
pub fn compile(
    source_path: impl AsRef<Path>,
    _stage: ShaderStageKind,
) -> Result<Vec<u32>, ShaderCompilerError> {
    Err(ShaderCompilerError::CompilationUnavailable(
        source_path.as_ref().to_path_buf(),
    ))
}

/// Uses the cached SPIR-V when present, otherwise compiles the source
pub fn compile_or_load_if_exists(
    source_path: impl AsRef<Path>,
    stage: ShaderStageKind,
) -> Result<Vec<u32>, ShaderCompilerError> {
    let cache_path = spirv_cache_path(&source_path, stage);
    if cache_path.is_file() {
        trace!("loading cached spirv {:?}", cache_path);
        return load_spirv(cache_path);
    }
    compile(source_path, stage)
}

/// The first non-empty, non-comment line must be `#version 450`
pub fn check_glsl_version(source: &str, path: &Path) -> Result<(), ShaderCompilerError> {
    let first_line = source
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with("//"));
    match first_line {
        Some(line) if line.split_whitespace().eq(["#version", "450"]) => Ok(()),
        _ => Err(ShaderCompilerError::UnsupportedVersion(path.to_path_buf())),
    }
}

// ~~ Shader Stages ~~

pub fn create_shader_stage(
    device: &Arc<Device>,
    name: &str,
    stage: ShaderStageKind,
) -> anyhow::Result<ShaderStage> {
    let source_path = shader_source_path(name, stage);
    let spirv = compile_or_load_if_exists(&source_path, stage)
        .with_context(|| format!("loading spirv for {:?}", source_path))?;

    let mut spirv_cursor = io::Cursor::new(bytemuck::cast_slice::<u32, u8>(&spirv));
    let shader_module = Arc::new(
        ShaderModule::new_from_spirv(device.clone(), &mut spirv_cursor)
            .with_context(|| format!("creating shader module for {:?}", source_path))?,
    );

    Ok(ShaderStage::new(
        stage.vk_flags(),
        shader_module,
        CString::new(SHADER_ENTRY_POINT).context("converting shader entry point to c-string")?,
        None,
    ))
}

/// Vertex and fragment stages of the scene pipeline
pub fn default_shader_stages(device: &Arc<Device>) -> anyhow::Result<(ShaderStage, ShaderStage)> {
    Ok((
        create_shader_stage(device, SCENE_SHADER_NAME, ShaderStageKind::Vertex)?,
        create_shader_stage(device, SCENE_SHADER_NAME, ShaderStageKind::Fragment)?,
    ))
}

pub fn overlay_shader_stages(device: &Arc<Device>) -> anyhow::Result<(ShaderStage, ShaderStage)> {
    Ok((
        create_shader_stage(device, OVERLAY_SHADER_NAME, ShaderStageKind::Vertex)?,
        create_shader_stage(device, OVERLAY_SHADER_NAME, ShaderStageKind::Fragment)?,
    ))
}

// ~~ Errors ~~

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderCompilerError {
    NotFound(PathBuf),
    Empty(PathBuf),
    InvalidSpirv { path: PathBuf, reason: String },
    Io { path: PathBuf, error: String },
    UnsupportedVersion(PathBuf),
    CompilerInit,
    Compilation { path: PathBuf, log: String },
    /// Built without the `shader-compile` feature and no cached spirv exists
    CompilationUnavailable(PathBuf),
}
impl std::error::Error for ShaderCompilerError {}
impl Display for ShaderCompilerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "shader file {:?} not found", path),
            Self::Empty(path) => write!(f, "shader file {:?} is empty", path),
            Self::InvalidSpirv { path, reason } => {
                write!(f, "{:?} is not valid spirv: {}", path, reason)
            }
            Self::Io { path, error } => write!(f, "failed to access {:?}: {}", path, error),
            Self::UnsupportedVersion(path) => {
                write!(f, "shader {:?} must start with `#version 450`", path)
            }
            Self::CompilerInit => write!(f, "failed to initialize shaderc"),
            Self::Compilation { path, log } => {
                write!(f, "failed to compile {:?}:\n{}", path, log)
            }
            Self::CompilationUnavailable(path) => write!(
                f,
                "no cached spirv for {:?} and shader compilation is disabled (enable the `shader-compile` feature)",
                path
            ),
        }
    }
}

// ~~ Tests ~~

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("shader_compiler_test_{}_{}", std::process::id(), name))
    }

    #[test]
    fn cache_path_appends_stage_index() {
        assert_eq!(
            spirv_cache_path("assets/shaders/scene.vert", ShaderStageKind::Vertex),
            PathBuf::from("assets/shaders/scene.vert_0.spv")
        );
        assert_eq!(
            spirv_cache_path("assets/shaders/scene.frag", ShaderStageKind::Fragment),
            PathBuf::from("assets/shaders/scene.frag_1.spv")
        );
        assert_eq!(
            shader_source_path(SCENE_SHADER_NAME, ShaderStageKind::Fragment),
            Path::new("assets/shaders").join("scene.frag")
        );
    }

    #[test]
    fn load_spirv_errors() {
        let missing = temp_path("missing.spv");
        assert_eq!(
            load_spirv(&missing),
            Err(ShaderCompilerError::NotFound(missing.clone()))
        );

        let empty = temp_path("empty.spv");
        std::fs::write(&empty, b"").unwrap();
        assert_eq!(load_spirv(&empty), Err(ShaderCompilerError::Empty(empty.clone())));
        std::fs::remove_file(&empty).unwrap();

        let odd = temp_path("odd.spv");
        std::fs::write(&odd, [0x03u8, 0x02, 0x23, 0x07, 0x00]).unwrap();
        assert!(matches!(
            load_spirv(&odd),
            Err(ShaderCompilerError::InvalidSpirv { .. })
        ));
        std::fs::remove_file(&odd).unwrap();

        let bad_magic = temp_path("bad_magic.spv");
        std::fs::write(&bad_magic, [0xdeu8, 0xad, 0xbe, 0xef]).unwrap();
        assert!(matches!(
            load_spirv(&bad_magic),
            Err(ShaderCompilerError::InvalidSpirv { .. })
        ));
        std::fs::remove_file(&bad_magic).unwrap();
    }

    #[test]
    fn load_spirv_reads_little_endian_words() {
        let path = temp_path("valid.spv");
        let words = [SPIRV_MAGIC_NUMBER, 0x0001_0000, 7];
        std::fs::write(&path, bytemuck::cast_slice::<u32, u8>(&words)).unwrap();
        assert_eq!(load_spirv(&path), Ok(words.to_vec()));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn glsl_version_check() {
        let path = Path::new("test.vert");
        assert!(check_glsl_version("#version 450\nvoid main() {}", path).is_ok());
        assert!(check_glsl_version("// header\n\n  #version  450\n", path).is_ok());
        assert_eq!(
            check_glsl_version("#version 460\n", path),
            Err(ShaderCompilerError::UnsupportedVersion(path.to_path_buf()))
        );
        assert!(check_glsl_version("", path).is_err());
    }

    #[cfg(feature = "shader-compile")]
    #[test]
    fn compiles_source_and_caches_spirv() {
        let source = temp_path("cached.vert");
        std::fs::write(
            &source,
            "#version 450\nvoid main() { gl_Position = vec4(0.0, 0.0, 0.0, 1.0); }\n",
        )
        .unwrap();
        let cache = spirv_cache_path(&source, ShaderStageKind::Vertex);
        let _ = std::fs::remove_file(&cache);

        let compiled = compile_or_load_if_exists(&source, ShaderStageKind::Vertex).unwrap();
        assert_eq!(compiled[0], SPIRV_MAGIC_NUMBER);
        assert!(cache.is_file());

        // second call reads the cache even once the source is gone
        std::fs::remove_file(&source).unwrap();
        assert_eq!(
            compile_or_load_if_exists(&source, ShaderStageKind::Vertex),
            Ok(compiled)
        );
        std::fs::remove_file(&cache).unwrap();
    }

    #[cfg(feature = "shader-compile")]
    #[test]
    fn scene_and_overlay_sources_compile() {
        for name in [SCENE_SHADER_NAME, OVERLAY_SHADER_NAME] {
            for stage in [ShaderStageKind::Vertex, ShaderStageKind::Fragment] {
                let source = shader_source_path(name, stage);
                let spirv = compile_or_load_if_exists(&source, stage)
                    .unwrap_or_else(|e| panic!("{}", e));
                assert_eq!(spirv[0], SPIRV_MAGIC_NUMBER);
            }
        }
    }

    #[cfg(not(feature = "shader-compile"))]
    #[test]
    fn compile_without_feature_is_unavailable() {
        let source = temp_path("unavailable.vert");
        assert_eq!(
            compile_or_load_if_exists(&source, ShaderStageKind::Vertex),
            Err(ShaderCompilerError::CompilationUnavailable(source.clone()))
        );
    }
}
