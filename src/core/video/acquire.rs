//! 媒体获取：yt-dlp 页面链接 / HTTP 直链 / 本地文件

use super::error::AcquisitionError;
use super::source::{LocalMedia, MediaAcquirer};
use crate::core::config::AcquireConfig;
use log::{debug, info, warn};
use reqwest::blocking::Client;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mov", "webm", "mkv", "avi", "flv", "ts", "gif", "mpg", "mpeg",
];

/// 媒体引用分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// 本地已存在的文件
    LocalFile,
    /// 以视频扩展名结尾的 http(s) 直链
    DirectUrl,
    /// 其他 http(s) 链接，交给 yt-dlp 解析
    PageUrl,
    Unknown,
}

pub fn classify(reference: &str) -> MediaKind {
    let reference = reference.trim();
    if reference.is_empty() {
        return MediaKind::Unknown;
    }

    let lower = reference.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        let path = lower
            .split(['?', '#'])
            .next()
            .unwrap_or_default();
        let file_name = path.rsplit('/').next().unwrap_or_default();
        let is_video = file_name
            .rsplit_once('.')
            .map(|(_, ext)| VIDEO_EXTENSIONS.contains(&ext))
            .unwrap_or(false);
        return if is_video {
            MediaKind::DirectUrl
        } else {
            MediaKind::PageUrl
        };
    }

    if local_path(reference).is_file() {
        MediaKind::LocalFile
    } else {
        MediaKind::Unknown
    }
}

fn local_path(reference: &str) -> PathBuf {
    PathBuf::from(reference.trim().strip_prefix("file://").unwrap_or(reference.trim()))
}

fn make_temp_dir(config: &AcquireConfig) -> Result<TempDir, AcquisitionError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("video-text-");
    let dir = match &config.download_dir {
        Some(parent) => builder.tempdir_in(parent)?,
        None => builder.tempdir()?,
    };
    Ok(dir)
}

/// 本地文件，任务结束后不删除
pub struct LocalFileAcquirer;

impl MediaAcquirer for LocalFileAcquirer {
    fn acquire(&self, reference: &str) -> Result<LocalMedia, AcquisitionError> {
        let path = local_path(reference);
        if !path.is_file() {
            return Err(AcquisitionError::Unresolvable(reference.to_string()));
        }
        Ok(LocalMedia::existing(path, reference))
    }
}

/// HTTP 直链下载到临时目录
pub struct HttpAcquirer {
    client: Client,
    config: AcquireConfig,
}

impl HttpAcquirer {
    pub fn new(config: AcquireConfig) -> Result<Self, AcquisitionError> {
        let client = Client::builder().user_agent(&config.user_agent).build()?;
        Ok(Self { client, config })
    }

    fn file_name_for(url: &str) -> String {
        let name = url
            .split(['?', '#'])
            .next()
            .and_then(|p| p.rsplit('/').next())
            .unwrap_or_default();
        let cleaned: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
            .collect();
        if cleaned.is_empty() || cleaned.starts_with('.') {
            "download.bin".to_string()
        } else {
            cleaned
        }
    }
}

impl MediaAcquirer for HttpAcquirer {
    fn acquire(&self, reference: &str) -> Result<LocalMedia, AcquisitionError> {
        info!("🌐 Downloading {}", reference);
        let dir = make_temp_dir(&self.config)?;
        let path = dir.path().join(Self::file_name_for(reference));

        let mut response = self.client.get(reference).send()?.error_for_status()?;
        let mut file = File::create(&path)?;
        let bytes = response.copy_to(&mut file)?;

        info!("✅ Downloaded {} bytes to {:?}", bytes, path);
        Ok(LocalMedia::temporary(path, reference, dir))
    }
}

/// 通过 yt-dlp 解析并下载页面中的视频
pub struct YtDlpAcquirer {
    config: AcquireConfig,
}

impl YtDlpAcquirer {
    pub fn new(config: AcquireConfig) -> Self {
        Self { config }
    }

    fn find_downloaded(dir: &Path, printed: &str) -> Option<PathBuf> {
        let printed = printed
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .map(PathBuf::from);
        if let Some(path) = printed.filter(|p| p.is_file()) {
            return Some(path);
        }

        // --print 不可用的旧版本：取目录里唯一的文件
        std::fs::read_dir(dir)
            .ok()?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .find(|p| p.is_file())
    }
}

impl MediaAcquirer for YtDlpAcquirer {
    fn acquire(&self, reference: &str) -> Result<LocalMedia, AcquisitionError> {
        let tool = self.config.ytdlp_binary.as_str();
        let dir = make_temp_dir(&self.config)?;
        let template = dir.path().join("%(id)s.%(ext)s");

        let mut cmd = Command::new(tool);
        cmd.arg("--quiet")
            .arg("--no-warnings")
            .arg("--no-playlist")
            .arg("--print")
            .arg("after_move:filepath")
            .arg("-o")
            .arg(&template);
        if let Some(format) = &self.config.format {
            cmd.arg("-f").arg(format);
        }
        cmd.arg(reference);

        info!("📥 yt-dlp: fetching {}", reference);
        let output = cmd
            .output()
            .map_err(|e| AcquisitionError::from_spawn(tool, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("❌ yt-dlp failed for {}: {}", reference, stderr);
            return Err(AcquisitionError::ToolFailed {
                tool: tool.to_string(),
                detail: if stderr.is_empty() {
                    format!("exit status {}", output.status)
                } else {
                    stderr
                },
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = Self::find_downloaded(dir.path(), &stdout).ok_or_else(|| {
            AcquisitionError::ToolFailed {
                tool: tool.to_string(),
                detail: "no file was downloaded".to_string(),
            }
        })?;

        debug!("yt-dlp wrote {:?}", path);
        Ok(LocalMedia::temporary(path, reference, dir))
    }
}

/// 按引用类型分派到具体的获取器
pub struct AutoAcquirer {
    local: LocalFileAcquirer,
    http: HttpAcquirer,
    ytdlp: YtDlpAcquirer,
}

impl AutoAcquirer {
    pub fn new(config: AcquireConfig) -> Result<Self, AcquisitionError> {
        Ok(Self {
            local: LocalFileAcquirer,
            http: HttpAcquirer::new(config.clone())?,
            ytdlp: YtDlpAcquirer::new(config),
        })
    }
}

impl MediaAcquirer for AutoAcquirer {
    fn acquire(&self, reference: &str) -> Result<LocalMedia, AcquisitionError> {
        let kind = classify(reference);
        debug!("Media reference {} classified as {:?}", reference, kind);
        match kind {
            MediaKind::LocalFile => self.local.acquire(reference),
            MediaKind::DirectUrl => self.http.acquire(reference.trim()),
            MediaKind::PageUrl => self.ytdlp.acquire(reference.trim()),
            MediaKind::Unknown => Err(AcquisitionError::Unresolvable(reference.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_urls() {
        assert_eq!(
            classify("https://cdn.example.com/clips/trip.MP4?token=abc"),
            MediaKind::DirectUrl
        );
        assert_eq!(
            classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            MediaKind::PageUrl
        );
        assert_eq!(classify("http://example.com/"), MediaKind::PageUrl);
        assert_eq!(classify(""), MediaKind::Unknown);
        assert_eq!(classify("not a thing"), MediaKind::Unknown);
    }

    #[test]
    fn test_classify_local_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let reference = file.path().to_string_lossy().to_string();
        assert_eq!(classify(&reference), MediaKind::LocalFile);
        assert_eq!(
            classify(&format!("file://{}", reference)),
            MediaKind::LocalFile
        );
    }

    #[test]
    fn test_local_acquirer_missing_file() {
        let result = LocalFileAcquirer.acquire("/definitely/not/here.mp4");
        assert!(matches!(result, Err(AcquisitionError::Unresolvable(_))));
    }

    #[test]
    fn test_local_acquirer_does_not_own_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let media = LocalFileAcquirer
            .acquire(&file.path().to_string_lossy())
            .unwrap();
        assert!(!media.is_temporary());
        assert_eq!(media.path(), file.path());
    }

    #[test]
    fn test_http_file_name_sanitized() {
        assert_eq!(
            HttpAcquirer::file_name_for("https://x.com/a/b/my clip.mp4?x=1"),
            "myclip.mp4"
        );
        assert_eq!(HttpAcquirer::file_name_for("https://x.com/"), "download.bin");
    }

    #[test]
    fn test_auto_acquirer_rejects_unknown() {
        let acquirer = AutoAcquirer::new(AcquireConfig::default()).unwrap();
        let result = acquirer.acquire("ftp-ish nonsense");
        assert!(matches!(result, Err(AcquisitionError::Unresolvable(_))));
    }

    #[test]
    fn test_missing_ytdlp_binary_reported() {
        let acquirer = YtDlpAcquirer::new(AcquireConfig {
            ytdlp_binary: "definitely-not-a-real-yt-dlp".to_string(),
            ..Default::default()
        });
        let result = acquirer.acquire("https://example.com/watch?v=1");
        assert!(matches!(result, Err(AcquisitionError::ToolMissing { .. })));
    }

    #[test]
    fn test_find_downloaded_falls_back_to_dir_listing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("abc.webm");
        std::fs::write(&file, b"x").unwrap();

        let found = YtDlpAcquirer::find_downloaded(dir.path(), "\n");
        assert_eq!(found, Some(file));
    }
}
