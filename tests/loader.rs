use pacresolver::{ContentLoader, FetchError, HttpContentLoader, PacResolver};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;
use url::Url;

/// Serves a single HTTP response on a local port.
fn serve_once(status: &'static str, body: &'static [u8]) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut line = String::new();
        while reader.read_line(&mut line).unwrap() > 0 {
            if line == "\r\n" {
                break;
            }
            line.clear();
        }
        let head = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/x-ns-proxy-autoconfig\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(head.as_bytes()).unwrap();
        stream.write_all(body).unwrap();
    });

    Url::parse(&format!("http://{addr}/proxy.pac")).unwrap()
}

#[test]
fn test_http_download() {
    let url = serve_once(
        "200 OK",
        b"function FindProxyForURL(url, host) { return \"PROXY gw.example.com:3128\"; }",
    );
    let loader = HttpContentLoader::with_timeout(Duration::from_secs(5)).unwrap();
    let text = loader.load(&url).unwrap();
    assert!(text.contains("gw.example.com:3128"));
}

#[test]
fn test_http_error_status() {
    let url = serve_once("404 Not Found", b"");
    let loader = HttpContentLoader::with_timeout(Duration::from_secs(5)).unwrap();
    match loader.load(&url) {
        Err(FetchError::Status { status }) => assert_eq!(status, 404),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_utf8_document() {
    let url = serve_once(
        "200 OK",
        "// Zürich office\nfunction FindProxyForURL(url, host) { return \"DIRECT\"; }".as_bytes(),
    );
    let loader = HttpContentLoader::new().unwrap();
    assert!(loader.load(&url).unwrap().contains("Zürich"));
}

#[test]
fn test_resolver_over_http() {
    let url = serve_once(
        "200 OK",
        b"function FindProxyForURL(url, host) { return isPlainHostName(host) ? \"DIRECT\" : \"PROXY gw:8080\"; }",
    );
    let resolver = PacResolver::builder(url)
        .fetch_timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    assert_eq!(
        resolver.resolve_str("http://intranet/").unwrap().as_deref(),
        Some("DIRECT")
    );
    assert_eq!(
        resolver.resolve_str("http://www.example.com/").unwrap().as_deref(),
        Some("PROXY gw:8080")
    );
}
