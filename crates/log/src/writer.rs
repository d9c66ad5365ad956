//! Writer construction

use std::io;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::config::WriterConfig;
use crate::LogResult;

#[cfg(feature = "file")]
pub(crate) type WriterGuard = Option<tracing_appender::non_blocking::WorkerGuard>;

#[cfg(not(feature = "file"))]
pub(crate) type WriterGuard = Option<()>;

/// Create a writer from configuration.
///
/// File writers run on a background worker; the returned guard flushes it
/// on drop.
pub(crate) fn make_writer(config: &WriterConfig) -> LogResult<(BoxMakeWriter, WriterGuard)> {
    let writer = match config {
        WriterConfig::Stderr => BoxMakeWriter::new(io::stderr),
        WriterConfig::Stdout => BoxMakeWriter::new(io::stdout),

        #[cfg(feature = "file")]
        WriterConfig::File { path, rolling } => {
            let (writer, guard) = file_writer(path, *rolling)?;
            return Ok((writer, Some(guard)));
        }
    };

    Ok((writer, None))
}

#[cfg(feature = "file")]
fn file_writer(
    path: &std::path::Path,
    rolling: crate::config::Rolling,
) -> LogResult<(BoxMakeWriter, tracing_appender::non_blocking::WorkerGuard)> {
    use crate::config::Rolling;
    use crate::LogError;

    let file_name = path.file_name().ok_or_else(|| {
        LogError::Config(format!("invalid log file path (no file name): '{}'", path.display()))
    })?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => std::path::Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let appender = match rolling {
        Rolling::Never => tracing_appender::rolling::never(dir, file_name),
        Rolling::Hourly => tracing_appender::rolling::hourly(dir, file_name),
        Rolling::Daily => tracing_appender::rolling::daily(dir, file_name),
    };
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    Ok((BoxMakeWriter::new(non_blocking), guard))
}

#[cfg(all(test, feature = "file"))]
mod tests {
    use super::*;
    use crate::config::Rolling;
    use crate::LogError;

    #[test]
    fn test_file_writer_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = WriterConfig::File {
            path: dir.path().join("logs").join("rotator.log"),
            rolling: Rolling::Never,
        };

        let (_writer, guard) = make_writer(&config).unwrap();

        assert!(guard.is_some());
        assert!(dir.path().join("logs").is_dir());
    }

    #[test]
    fn test_path_without_file_name_is_rejected() {
        let config = WriterConfig::File {
            path: "/".into(),
            rolling: Rolling::Daily,
        };
        assert!(matches!(make_writer(&config), Err(LogError::Config(_))));
    }

    #[test]
    fn test_stderr_needs_no_guard() {
        let (_writer, guard) = make_writer(&WriterConfig::Stderr).unwrap();
        assert!(guard.is_none());
    }
}
