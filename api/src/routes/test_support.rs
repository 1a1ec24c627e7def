use std::path::Path;
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use camera_panel_common::config::Config;

use crate::context::AppContext;

pub const MODULES_JSON: &str = r#"{"camera_modules": [
    {"sensor_model": "imx477", "module_name": "HQ Camera", "megapixels": 12.3}
]}"#;

pub struct TestApp {
    pub base: String,
    pub ctx: Arc<AppContext>,
    pub client: reqwest::Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.capture.available_resolutions = vec![[64, 48], [96, 72]];
    config.capture.resolution = 0;
    config.stream.fps = 60.0;
    config.gallery.dir = dir.join("gallery");
    config.settings.state_path = dir.join("camera-settings.json");
    config.settings.module_info_path = dir.join("camera-module-info.json");
    config
}

/// Start the full router on an ephemeral port.
pub async fn spawn_app(dir: &Path) -> TestApp {
    std::fs::write(dir.join("camera-module-info.json"), MODULES_JSON).unwrap();
    spawn_with_config(test_config(dir)).await
}

pub async fn spawn_with_config(config: Config) -> TestApp {
    let ctx = tokio::task::spawn_blocking(move || AppContext::from_config(&config))
        .await
        .unwrap()
        .unwrap();
    let ctx = Arc::new(ctx);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = super::router(Arc::clone(&ctx));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        base: format!("http://{addr}"),
        ctx,
        client: reqwest::Client::new(),
    }
}

/// Splits a `/video_feed` body back into its JPEG images.
///
/// A part is only returned once the boundary after it has arrived, so the
/// last image in the buffer waits for the next part.
#[derive(Default)]
pub struct PartReader {
    pending: BytesMut,
}

const BOUNDARY: &[u8] = b"--frame\r\n";
const HEADERS_END: &[u8] = b"\r\n\r\n";
const NEXT_BOUNDARY: &[u8] = b"\r\n--frame\r\n";

impl PartReader {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.pending.extend_from_slice(chunk);
        std::iter::from_fn(|| self.next_image()).collect()
    }

    fn next_image(&mut self) -> Option<Bytes> {
        let headers = find(&self.pending, BOUNDARY)? + BOUNDARY.len();
        let body = headers + find(&self.pending[headers..], HEADERS_END)? + HEADERS_END.len();
        let len = find(&self.pending[body..], NEXT_BOUNDARY)?;

        self.pending.advance(body);
        let image = self.pending.split_to(len).freeze();
        // Leave the next boundary at the front.
        self.pending.advance(2);
        Some(image)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[test]
fn part_reader_reassembles_split_parts() {
    use camera_panel_common::mjpeg::encode_part;

    let mut wire = b"stray bytes".to_vec();
    for image in [&b"first"[..], &b"second\r\nline"[..], &b"third"[..]] {
        wire.extend_from_slice(&encode_part(image));
    }

    let mut reader = PartReader::default();
    let mut images = Vec::new();
    for byte in &wire {
        images.extend(reader.feed(std::slice::from_ref(byte)));
    }
    assert_eq!(images, vec![Bytes::from("first"), Bytes::from("second\r\nline")]);

    let tail = reader.feed(&encode_part(b"fourth"));
    assert_eq!(tail, vec![Bytes::from("third")]);
}
