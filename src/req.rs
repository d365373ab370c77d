use std::{sync::OnceLock, time::Duration};

fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .expect("default reqwest client")
    })
}

pub(crate) async fn req_get(url: &str) -> Result<reqwest::Response, reqwest::Error> {
    log::trace!("GET {url}");
    http_client().get(url).send().await
}

pub(crate) async fn req_head(url: &str) -> Result<reqwest::Response, reqwest::Error> {
    log::trace!("HEAD {url}");
    http_client().head(url).send().await
}

pub(crate) async fn req_post(url: &str, body: &str) -> Result<reqwest::Response, reqwest::Error> {
    log::trace!("POST {url} {body}");
    http_client()
        .post(url)
        .header("content-type", "application/jose+json")
        .body(body.to_owned())
        .send()
        .await
}

/// Reads a response header as an owned string, if present and valid UTF-8.
pub(crate) fn header(res: &reqwest::Response, name: &str) -> Option<String> {
    res.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

pub(crate) async fn safe_read_body(res: reqwest::Response) -> String {
    // some servers close the TLS connection abruptly after writing the body;
    // treat a broken read as an empty body rather than an error.
    res.text().await.unwrap_or_default()
}
