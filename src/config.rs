// This module holds ToolchainConfig, the configuration surface of the pipeline. The
// only tunable the reference toolchain exposes is the install directory of the LLVM-JVM
// translator, read from the LLVM_JVM_HOME environment variable with a fallback to the
// conventional install location. Tool program names and the javac language-version
// flags are fixed: they identify black boxes on PATH, not behavior this crate owns.
// Derived accessors build the translator executable path and its classpath argument so
// the orchestrator never concatenates paths itself.

//! Toolchain location and tool names.

use std::env;
use std::path::{Path, PathBuf};

/// Environment variable naming the LLVM-JVM translator install directory.
pub const ENV_TOOLCHAIN_HOME: &str = "LLVM_JVM_HOME";

/// Conventional translator install location used when the variable is unset.
pub const DEFAULT_TOOLCHAIN_HOME: &str = "/home/awsgui/LLVM-JVM";

/// Bytecode target accepted by the translator.
const JAVA_RELEASE: &str = "1.7";

/// Names of the external programs each stage invokes.
#[derive(Debug, Clone)]
pub struct ToolchainConfig {
    /// Install directory of the LLVM-JVM translator toolchain.
    pub translator_home: PathBuf,
    /// Java compiler.
    pub javac: String,
    /// Java class-file disassembler.
    pub javap: String,
    /// Translator executable name under `translator_home`.
    pub translator_bin: String,
    /// LLVM IR assembler.
    pub llvm_as: String,
    /// LLVM optimizer and graph emitter.
    pub opt: String,
    /// Graphviz layout tool.
    pub dot: String,
}

impl ToolchainConfig {
    /// Build a configuration rooted at the given translator install directory.
    pub fn with_home(translator_home: impl Into<PathBuf>) -> Self {
        Self {
            translator_home: translator_home.into(),
            javac: "javac".to_string(),
            javap: "javap".to_string(),
            translator_bin: "Main.exe".to_string(),
            llvm_as: "llvm-as".to_string(),
            opt: "opt".to_string(),
            dot: "dot".to_string(),
        }
    }

    /// Build a configuration from `LLVM_JVM_HOME`, falling back to the
    /// conventional install location when unset.
    pub fn from_env() -> Self {
        let home = env::var_os(ENV_TOOLCHAIN_HOME)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TOOLCHAIN_HOME));
        Self::with_home(home)
    }

    /// Full path of the translator executable.
    pub fn translator_exe(&self) -> PathBuf {
        self.translator_home.join(&self.translator_bin)
    }

    /// Classpath argument handed to the translator: the workspace itself plus
    /// the toolchain's runtime classes.
    pub fn translator_classpath(&self) -> String {
        format!("./:{}", self.translator_home.join("rt").display())
    }

    /// Language-version flags appended to every compile invocation.
    pub fn compile_flags(&self) -> [&str; 4] {
        ["-target", JAVA_RELEASE, "-source", JAVA_RELEASE]
    }

    /// Translator install directory.
    pub fn home(&self) -> &Path {
        &self.translator_home
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translator_paths() {
        let config = ToolchainConfig::with_home("/opt/llvm-jvm");
        assert_eq!(
            config.translator_exe(),
            PathBuf::from("/opt/llvm-jvm/Main.exe")
        );
        assert_eq!(config.translator_classpath(), "./:/opt/llvm-jvm/rt");
    }

    #[test]
    fn test_compile_flags_pin_language_version() {
        let config = ToolchainConfig::with_home("/opt/llvm-jvm");
        assert_eq!(config.compile_flags(), ["-target", "1.7", "-source", "1.7"]);
    }

    #[test]
    fn test_from_env_falls_back_to_default_home() {
        // Keep this the only test that touches the variable; tests share one
        // process environment.
        env::remove_var(ENV_TOOLCHAIN_HOME);
        let config = ToolchainConfig::from_env();
        assert_eq!(config.translator_home, PathBuf::from(DEFAULT_TOOLCHAIN_HOME));

        env::set_var(ENV_TOOLCHAIN_HOME, "/custom/llvm-jvm");
        let config = ToolchainConfig::from_env();
        assert_eq!(config.translator_home, PathBuf::from("/custom/llvm-jvm"));
        env::remove_var(ENV_TOOLCHAIN_HOME);
    }
}
