//! Sessions with a remote scoring service.

use lazy_static::lazy_static;
use regex::Regex;
use reqwest::blocking::{multipart, Client};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::JobHandle;
use crate::error::VarMergeError;

lazy_static! {
    static ref JOB_LINK: Regex =
        Regex::new(r#"href="([^"]*/(?:check_avail|static/finished)/[^"]+)""#).unwrap();
    static ref LAST_SEGMENT: Regex = Regex::new(r"/([^/]+)$").unwrap();
}

/// Where a finished job's results can be downloaded.
pub const FINISHED_PATH: &str = "/static/finished/";

/// Where a job's status can be checked.
pub const CHECK_AVAIL_PATH: &str = "/check_avail/";

/// The asynchronous submit, poll, and fetch workflow of a remote scorer.
pub trait AnnotationSession {
    /// Upload a gzipped VCF.
    fn submit(&mut self, file: &Path) -> Result<JobHandle, VarMergeError>;
    /// Whether the job's results are ready.
    fn poll(&mut self, job: &JobHandle) -> Result<bool, VarMergeError>;
    /// Download the results into `dir`, returning the downloaded file.
    fn fetch(&mut self, job: &JobHandle, dir: &Path) -> Result<PathBuf, VarMergeError>;
}

/// Opens a fresh session for each chunk.
pub trait SessionFactory: Sync {
    fn open(&self, chunk_id: usize) -> Result<Box<dyn AnnotationSession>, VarMergeError>;
}

/// The job file name at the end of a job URL, e.g.
/// `https://cadd.bihealth.org/check_avail/GRCh38-v1.7_fdf9.tsv.gz` gives
/// `GRCh38-v1.7_fdf9.tsv.gz`.
pub fn extract_job_file(url: &str) -> Result<String, VarMergeError> {
    LAST_SEGMENT
        .captures(url)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| {
            VarMergeError::AnnotationServiceError(format!(
                "invalid job URL '{}': file name not found",
                url
            ))
        })
}

/// Find the job link in a CADD upload response page.
pub fn find_job_link(page: &str) -> Option<&str> {
    JOB_LINK
        .captures(page)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// A session with the CADD web service.
pub struct CaddHttpSession {
    client: Client,
    base_url: String,
    version: String,
}

impl CaddHttpSession {
    pub fn new(base_url: &str, version: &str, timeout: Duration) -> Result<Self, VarMergeError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            version: version.to_string(),
        })
    }

    fn get_text(&self, url: &str) -> Result<String, VarMergeError> {
        let response = self.client.get(url).send()?.error_for_status()?;
        Ok(response.text()?)
    }
}

impl AnnotationSession for CaddHttpSession {
    fn submit(&mut self, file: &Path) -> Result<JobHandle, VarMergeError> {
        let form = multipart::Form::new()
            .text("version", self.version.clone())
            .file("file", file)?;
        let url = format!("{}/upload", self.base_url);
        let page = self
            .client
            .post(&url)
            .multipart(form)
            .send()?
            .error_for_status()?
            .text()?;
        let link = find_job_link(&page).ok_or_else(|| {
            VarMergeError::AnnotationServiceError(format!(
                "no job status link ({} or {}) in the response to uploading {}",
                CHECK_AVAIL_PATH,
                FINISHED_PATH,
                file.display()
            ))
        })?;
        let handle = JobHandle::new(extract_job_file(link)?);
        log::info!("submitted {} as CADD job {}", file.display(), handle.job_file);
        Ok(handle)
    }

    fn poll(&mut self, job: &JobHandle) -> Result<bool, VarMergeError> {
        let url = format!("{}{}{}", self.base_url, CHECK_AVAIL_PATH, job.job_file);
        Ok(self.get_text(&url)?.contains(FINISHED_PATH))
    }

    fn fetch(&mut self, job: &JobHandle, dir: &Path) -> Result<PathBuf, VarMergeError> {
        let url = format!("{}{}{}", self.base_url, FINISHED_PATH, job.job_file);
        let mut response = self.client.get(&url).send()?.error_for_status()?;
        let path = dir.join(&job.job_file);
        let mut file = File::create(&path)?;
        response.copy_to(&mut file)?;
        log::debug!("downloaded {} to {}", url, path.display());
        Ok(path)
    }
}

/// Opens [`CaddHttpSession`]s.
#[derive(Clone, Debug)]
pub struct CaddSessionFactory {
    pub base_url: String,
    pub version: String,
    pub timeout: Duration,
}

impl CaddSessionFactory {
    pub fn new(base_url: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            version: version.into(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl SessionFactory for CaddSessionFactory {
    fn open(&self, _chunk_id: usize) -> Result<Box<dyn AnnotationSession>, VarMergeError> {
        Ok(Box::new(CaddHttpSession::new(
            &self.base_url,
            &self.version,
            self.timeout,
        )?))
    }
}
