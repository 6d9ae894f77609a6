//! The rendering pipeline: engine profiles, command construction, subprocess
//! execution, result classification, and work-file lifecycle.

mod command;
mod runner;

pub use command::{OptionMap, OptionValue, RenderConfig};
pub use runner::{ProcessError, ProcessResult, ProcessRunner};

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{application::error::EngineError, config::RenderSettings, domain::Document};

/// How a renderer family hands back its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineFamily {
    /// PDF bytes arrive on the subprocess's stdout (wkhtmltopdf).
    Stdout,
    /// The renderer writes `<work-file>.pdf` plus auxiliary artifacts (TeX).
    WorkFile,
}

#[derive(Debug, Clone)]
struct EngineProfile {
    binary: PathBuf,
    family: EngineFamily,
    defaults: OptionMap,
}

/// Immutable engine configuration threaded in from [`crate::config::Settings`]
/// at startup. There is no process-global renderer state.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub default_engine: String,
    pub work_dir: PathBuf,
    pub wkhtmltopdf_binary: PathBuf,
    pub tex_binary: PathBuf,
    pub timeout: Option<Duration>,
}

impl From<&RenderSettings> for EngineSettings {
    fn from(settings: &RenderSettings) -> Self {
        Self {
            default_engine: settings.default_engine.clone(),
            work_dir: settings.work_dir.clone(),
            wkhtmltopdf_binary: settings.wkhtmltopdf_binary.clone(),
            tex_binary: settings.tex_binary.clone(),
            timeout: settings.timeout,
        }
    }
}

/// Orchestrates one render: resolve the engine profile, build the command,
/// run the renderer, classify the outcome, and return raw PDF bytes.
#[derive(Debug, Clone)]
pub struct RenderEngine {
    settings: EngineSettings,
    runner: ProcessRunner,
}

impl RenderEngine {
    pub fn new(settings: EngineSettings) -> Self {
        let runner = ProcessRunner::new(settings.timeout);
        Self { settings, runner }
    }

    pub fn default_engine(&self) -> &str {
        &self.settings.default_engine
    }

    /// Render `document` with the named engine. Succeeds only with non-empty
    /// PDF bytes; every failure is a classified [`EngineError`].
    pub async fn generate(
        &self,
        engine: &str,
        document: &Document,
    ) -> Result<Bytes, EngineError> {
        let started_at = Instant::now();
        let profile = self.profile(engine)?;
        let binary = resolve_binary(&profile.binary)?;

        // create_dir_all treats a concurrently created directory as success,
        // so the lost-creation race stays benign.
        tokio::fs::create_dir_all(&self.settings.work_dir)
            .await
            .map_err(|err| {
                EngineError::configuration(format!(
                    "work directory `{}` could not be created: {err}",
                    self.settings.work_dir.display()
                ))
            })?;

        let mut options = profile.defaults.clone();
        options.merge(self.document_overrides(&profile, document));
        let config = RenderConfig::new(binary, options);
        let payload = document.content().as_bytes();

        let outcome = match profile.family {
            EngineFamily::Stdout => self.generate_via_stdout(&config, payload).await,
            EngineFamily::WorkFile => {
                let work_file = self.settings.work_dir.join(Uuid::new_v4().to_string());
                let outcome = self
                    .generate_via_work_file(&config, &work_file, payload)
                    .await;
                // Artifacts are removed on success and failure alike.
                self.cleanup_work_files(&work_file).await;
                outcome
            }
        };

        match &outcome {
            Ok(pdf) => {
                info!(
                    target = "application::engine",
                    op = "engine::generate",
                    result = "ok",
                    engine = engine,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    pdf_bytes = pdf.len(),
                    "Document rendered"
                );
            }
            Err(err) => {
                warn!(
                    target = "application::engine",
                    op = "engine::generate",
                    result = "error",
                    engine = engine,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    error = %err,
                    "Render failed"
                );
            }
        }

        outcome
    }

    async fn generate_via_stdout(
        &self,
        config: &RenderConfig,
        payload: &[u8],
    ) -> Result<Bytes, EngineError> {
        let mut tokens = config.tokens();
        // Read markup from stdin, write PDF to stdout.
        tokens.push("-".to_string());
        tokens.push("-".to_string());

        let result = self.runner.run(&tokens, payload).await?;
        classify(&result)?;
        Ok(Bytes::from(result.stdout))
    }

    async fn generate_via_work_file(
        &self,
        config: &RenderConfig,
        work_file: &Path,
        payload: &[u8],
    ) -> Result<Bytes, EngineError> {
        tokio::fs::write(work_file, payload).await?;

        let mut tokens = config.tokens();
        tokens.push(work_file.to_string_lossy().into_owned());

        let result = self.runner.run(&tokens, payload).await?;
        classify(&result)?;

        let pdf_path = work_file.with_extension("pdf");
        let pdf = tokio::fs::read(&pdf_path).await.map_err(|err| {
            EngineError::render(format!(
                "renderer produced no readable output file `{}`: {err}",
                pdf_path.display()
            ))
        })?;
        if pdf.is_empty() {
            return Err(EngineError::render("renderer did not return any data"));
        }

        Ok(Bytes::from(pdf))
    }

    async fn cleanup_work_files(&self, work_file: &Path) {
        let mut targets = vec![work_file.to_path_buf()];
        for extension in ["aux", "log", "pdf"] {
            targets.push(work_file.with_extension(extension));
        }

        for path in targets {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(
                        target = "application::engine",
                        op = "engine::cleanup",
                        path = %path.display(),
                        error = %err,
                        "Failed to remove work-file artifact"
                    );
                }
            }
        }
    }

    fn profile(&self, engine: &str) -> Result<EngineProfile, EngineError> {
        match engine.to_ascii_lowercase().as_str() {
            "wkhtmltopdf" => Ok(EngineProfile {
                binary: self.settings.wkhtmltopdf_binary.clone(),
                family: EngineFamily::Stdout,
                defaults: OptionMap::from([("quiet", OptionValue::Flag(true))]),
            }),
            "tex" | "latex" => Ok(EngineProfile {
                binary: self.settings.tex_binary.clone(),
                family: EngineFamily::WorkFile,
                defaults: OptionMap::from([(
                    "output-directory",
                    OptionValue::text(self.settings.work_dir.to_string_lossy()),
                )]),
            }),
            other => Err(EngineError::configuration(format!(
                "unknown render engine `{other}`"
            ))),
        }
    }

    /// Caller-supplied document options, merged over the profile defaults.
    /// The TeX family takes its page setup from the markup itself.
    fn document_overrides(&self, profile: &EngineProfile, document: &Document) -> OptionMap {
        match profile.family {
            EngineFamily::Stdout => OptionMap::from([
                (
                    "orientation",
                    OptionValue::text(document.orientation().as_str()),
                ),
                ("encoding", OptionValue::text(document.encoding())),
            ]),
            EngineFamily::WorkFile => OptionMap::new(),
        }
    }
}

/// The documented failure-classification policy, in priority order: stderr
/// mentioning "error" wins over a zero exit, empty output is always fatal,
/// and a nonzero exit alone (with silent stderr) is not.
fn classify(result: &ProcessResult) -> Result<(), EngineError> {
    let stderr = result.stderr_text();
    if stderr.to_lowercase().contains("error") {
        return Err(EngineError::render(format!(
            "renderer reported an error: {stderr}"
        )));
    }
    if result.stdout.is_empty() {
        return Err(EngineError::render("renderer did not return any data"));
    }
    if result.exit_code() != 0 && !stderr.is_empty() {
        return Err(EngineError::render(format!(
            "renderer exited with status {}",
            result.exit_code()
        )));
    }
    Ok(())
}

fn resolve_binary(binary: &Path) -> Result<PathBuf, EngineError> {
    let not_usable = || {
        EngineError::configuration(format!(
            "renderer binary is not found or not executable: {}",
            binary.display()
        ))
    };

    if binary.components().count() > 1 {
        return is_executable(binary)
            .then(|| binary.to_path_buf())
            .ok_or_else(not_usable);
    }

    // Bare name: resolve against PATH so the pre-spawn check still applies.
    let path_var = std::env::var_os("PATH").unwrap_or_default();
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(binary))
        .find(|candidate| is_executable(candidate))
        .ok_or_else(not_usable)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).expect("write script");
        let mut perms = fs::metadata(&path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("set perms");
        path
    }

    fn engine_with(dir: &TempDir, script: &Path) -> RenderEngine {
        RenderEngine::new(EngineSettings {
            default_engine: "wkhtmltopdf".to_string(),
            work_dir: dir.path().join("work"),
            wkhtmltopdf_binary: script.to_path_buf(),
            tex_binary: script.to_path_buf(),
            timeout: None,
        })
    }

    #[tokio::test]
    async fn stdout_family_returns_stdout_bytes() {
        let dir = TempDir::new().expect("temp dir");
        let script = write_script(
            &dir,
            "fake-wkhtmltopdf",
            "#!/bin/sh\nprintf '%%PDF-1.4 '\ncat\n",
        );
        let engine = engine_with(&dir, &script);

        let pdf = engine
            .generate("wkhtmltopdf", &Document::new("<h1>Hi</h1>"))
            .await
            .expect("render succeeds");

        assert!(pdf.starts_with(b"%PDF-1.4"));
        assert!(pdf.len() > "%PDF-1.4 ".len());
    }

    #[tokio::test]
    async fn passes_document_options_as_flags() {
        let dir = TempDir::new().expect("temp dir");
        let args_path = dir.path().join("args.log");
        let script = write_script(
            &dir,
            "fake-wkhtmltopdf",
            &format!("#!/bin/sh\necho \"$@\" > \"{}\"\ncat\n", args_path.display()),
        );
        let engine = engine_with(&dir, &script);

        let mut document = Document::new("body");
        document.set_orientation(crate::domain::Orientation::Landscape);
        engine
            .generate("wkhtmltopdf", &document)
            .await
            .expect("render succeeds");

        let args = fs::read_to_string(&args_path).expect("read args");
        assert!(args.contains("--quiet"), "missing --quiet: {args}");
        assert!(
            args.contains("--orientation Landscape"),
            "missing orientation override: {args}"
        );
        assert!(
            args.contains("--encoding UTF-8"),
            "missing encoding: {args}"
        );
    }

    #[tokio::test]
    async fn stderr_mentioning_error_wins_over_zero_exit() {
        let dir = TempDir::new().expect("temp dir");
        let script = write_script(
            &dir,
            "fake-renderer",
            "#!/bin/sh\ncat > /dev/null\necho 'Error: bad input' >&2\necho data\nexit 0\n",
        );
        let engine = engine_with(&dir, &script);

        let err = engine
            .generate("wkhtmltopdf", &Document::new("x"))
            .await
            .expect_err("stderr content must be fatal");

        match err {
            EngineError::Render(message) => {
                assert!(message.contains("Error: bad input"), "stderr not carried: {message}");
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[tokio::test]
    async fn nonzero_exit_with_silent_stderr_is_not_fatal() {
        let dir = TempDir::new().expect("temp dir");
        let script = write_script(
            &dir,
            "fake-renderer",
            "#!/bin/sh\ncat > /dev/null\nprintf '%%PDF-1.4 data'\nexit 1\n",
        );
        let engine = engine_with(&dir, &script);

        let pdf = engine
            .generate("wkhtmltopdf", &Document::new("x"))
            .await
            .expect("nonzero exit alone is not fatal");
        assert!(!pdf.is_empty());
    }

    #[tokio::test]
    async fn nonzero_exit_with_stderr_text_names_the_code() {
        let dir = TempDir::new().expect("temp dir");
        let script = write_script(
            &dir,
            "fake-renderer",
            "#!/bin/sh\ncat > /dev/null\necho warning >&2\necho data\nexit 7\n",
        );
        let engine = engine_with(&dir, &script);

        let err = engine
            .generate("wkhtmltopdf", &Document::new("x"))
            .await
            .expect_err("nonzero exit with stderr must fail");

        match err {
            EngineError::Render(message) => {
                assert!(message.contains('7'), "exit code not named: {message}");
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_output_is_never_a_success() {
        let dir = TempDir::new().expect("temp dir");
        let script = write_script(&dir, "fake-renderer", "#!/bin/sh\ncat > /dev/null\nexit 1\n");
        let engine = engine_with(&dir, &script);

        let err = engine
            .generate("wkhtmltopdf", &Document::new("x"))
            .await
            .expect_err("empty output must fail");

        match err {
            EngineError::Render(message) => {
                assert!(message.contains("did not return any data"), "{message}");
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_engine_is_a_configuration_error() {
        let dir = TempDir::new().expect("temp dir");
        let script = write_script(&dir, "fake-renderer", "#!/bin/sh\ncat\n");
        let engine = engine_with(&dir, &script);

        let err = engine
            .generate("dot-matrix", &Document::new("x"))
            .await
            .expect_err("unknown engine must fail");
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[tokio::test]
    async fn missing_binary_fails_before_spawning() {
        let dir = TempDir::new().expect("temp dir");
        let engine = RenderEngine::new(EngineSettings {
            default_engine: "wkhtmltopdf".to_string(),
            work_dir: dir.path().join("work"),
            wkhtmltopdf_binary: dir.path().join("missing-renderer"),
            tex_binary: dir.path().join("missing-renderer"),
            timeout: None,
        });

        let err = engine
            .generate("wkhtmltopdf", &Document::new("x"))
            .await
            .expect_err("missing binary must fail");

        match err {
            EngineError::Configuration(message) => {
                assert!(message.contains("not found or not executable"), "{message}");
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    fn tex_stub(dir: &TempDir) -> PathBuf {
        // Mimics a TeX toolchain: consumes stdin, writes the .pdf output and
        // the usual .aux/.log siblings next to the work file (last argument),
        // and reports progress on stdout.
        write_script(
            dir,
            "fake-latexpdf",
            r#"#!/bin/sh
cat > /dev/null
for last; do :; done
printf '%%PDF-1.4 from-tex' > "$last.pdf"
: > "$last.aux"
: > "$last.log"
echo "This is fakeTeX"
"#,
        )
    }

    #[tokio::test]
    async fn work_file_family_reads_the_output_file_and_cleans_up() {
        let dir = TempDir::new().expect("temp dir");
        let script = tex_stub(&dir);
        let engine = engine_with(&dir, &script);

        let pdf = engine
            .generate("tex", &Document::new("\\documentclass{article}"))
            .await
            .expect("render succeeds");
        assert_eq!(&pdf[..], b"%PDF-1.4 from-tex");

        let leftovers: Vec<_> = fs::read_dir(dir.path().join("work"))
            .expect("work dir exists")
            .collect();
        assert!(leftovers.is_empty(), "artifacts leaked: {leftovers:?}");
    }

    #[tokio::test]
    async fn work_file_family_cleans_up_on_failure_too() {
        let dir = TempDir::new().expect("temp dir");
        let script = write_script(
            &dir,
            "fake-latexpdf",
            r#"#!/bin/sh
cat > /dev/null
for last; do :; done
: > "$last.aux"
: > "$last.log"
echo "Error: undefined control sequence" >&2
echo "This is fakeTeX"
exit 1
"#,
        );
        let engine = engine_with(&dir, &script);

        engine
            .generate("latex", &Document::new("\\oops"))
            .await
            .expect_err("renderer error must fail");

        let leftovers: Vec<_> = fs::read_dir(dir.path().join("work"))
            .expect("work dir exists")
            .collect();
        assert!(leftovers.is_empty(), "artifacts leaked: {leftovers:?}");
    }

    #[tokio::test]
    async fn creates_the_work_directory_when_absent() {
        let dir = TempDir::new().expect("temp dir");
        let script = tex_stub(&dir);
        let work_dir = dir.path().join("deep").join("work");
        let engine = RenderEngine::new(EngineSettings {
            default_engine: "wkhtmltopdf".to_string(),
            work_dir: work_dir.clone(),
            wkhtmltopdf_binary: script.clone(),
            tex_binary: script,
            timeout: None,
        });

        engine
            .generate("tex", &Document::new("content"))
            .await
            .expect("render succeeds");
        assert!(work_dir.is_dir());
    }
}
