//! rollcall-capture — one contract over "read an uploaded file" and "poll
//! a network camera snapshot". Consumers only ever see bytes; decoding is
//! the core's job.

use std::time::Duration;
use thiserror::Error;

/// Snapshot path served by the IP Webcam app family.
const SNAPSHOT_PATH: &str = "/photo.jpg";

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("webcam request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webcam returned HTTP {status}")]
    BadStatus { status: u16 },
    #[error("webcam returned an empty body")]
    EmptyBody,
}

/// A network camera polled for JPEG snapshots.
pub struct IpCameraSource {
    url: String,
    auth: Option<(String, String)>,
    client: reqwest::Client,
}

impl IpCameraSource {
    pub fn new(
        ip_address: &str,
        port: u16,
        auth: Option<(String, String)>,
        timeout: Duration,
    ) -> Result<Self, CaptureError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: snapshot_url(ip_address, port),
            auth,
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Poll the camera for one snapshot.
    pub async fn fetch(&self) -> Result<Vec<u8>, CaptureError> {
        let mut request = self.client.get(&self.url);
        if let Some((user, password)) = &self.auth {
            request = request.basic_auth(user, Some(password));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %self.url, status = status.as_u16(), "webcam snapshot refused");
            return Err(CaptureError::BadStatus { status: status.as_u16() });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(CaptureError::EmptyBody);
        }

        tracing::debug!(url = %self.url, len = bytes.len(), "webcam snapshot captured");
        Ok(bytes.to_vec())
    }
}

fn snapshot_url(ip_address: &str, port: u16) -> String {
    format!("http://{ip_address}:{port}{SNAPSHOT_PATH}")
}

/// Where a check-in image comes from: an already-uploaded byte buffer or a
/// polled network camera.
pub enum ImageSource {
    Upload(Vec<u8>),
    IpCamera(IpCameraSource),
}

impl ImageSource {
    /// Produce the raw image bytes for one capture.
    pub async fn fetch(&self) -> Result<Vec<u8>, CaptureError> {
        match self {
            ImageSource::Upload(bytes) => Ok(bytes.clone()),
            ImageSource::IpCamera(camera) => camera.fetch().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_url_shape() {
        let camera =
            IpCameraSource::new("192.168.1.20", 8080, None, Duration::from_secs(10)).unwrap();
        assert_eq!(camera.url(), "http://192.168.1.20:8080/photo.jpg");
    }

    #[tokio::test]
    async fn test_upload_source_returns_bytes_verbatim() {
        let source = ImageSource::Upload(vec![1, 2, 3, 4]);
        assert_eq!(source.fetch().await.unwrap(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_ip_camera_unreachable_propagates_cause() {
        // Reserved TEST-NET address; connection should fail fast.
        let camera = IpCameraSource::new(
            "192.0.2.1",
            8080,
            None,
            Duration::from_millis(100),
        )
        .unwrap();
        let err = camera.fetch().await.unwrap_err();
        assert!(matches!(err, CaptureError::Http(_)));
    }
}
