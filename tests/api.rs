//! End-to-end tests of the HTTP gateway.

use std::io::{Cursor, Read};

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use lopdf::{dictionary, Document, Object, Stream};
use serde_json::Value;
use tower::ServiceExt;

use yukomp::{api, ServiceConfig};

const BOUNDARY: &str = "yukomp-test-boundary";

struct Part<'a> {
    field: &'a str,
    filename: &'a str,
    data: Vec<u8>,
}

fn part<'a>(field: &'a str, filename: &'a str, data: Vec<u8>) -> Part<'a> {
    Part {
        field,
        filename,
        data,
    }
}

fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for p in parts {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, p.field, p.filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(&p.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
    let response = api::router(&ServiceConfig::default())
        .oneshot(request)
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

async fn get(uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let (status, _, body) = send(request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> &'a str {
    headers.get(name).unwrap().to_str().unwrap()
}

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 4) as u8, (y * 4) as u8, ((x + y) * 2) as u8])
    }))
}

fn encoded(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

fn noise(len: usize) -> Vec<u8> {
    let mut state: u32 = 0x1234_5678;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}

/// One page drawing one uncompressed 120x120 noise image.
fn pdf_with_raw_image() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 120i64,
            "Height" => 120i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8i64,
        },
        noise(120 * 120 * 3),
    ));
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        b"q 120 0 0 120 0 0 cm /Im0 Do Q".to_vec(),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => Object::Reference(pages_id),
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(612),
            Object::Integer(792),
        ],
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => Object::Reference(image_id) },
        },
        "Contents" => Object::Reference(content_id),
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => Object::Integer(1),
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

// === Service ===

#[tokio::test]
async fn root_lists_endpoints() {
    let (status, body) = get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["endpoints"]["pdf_compression"], "/api/compress/pdf");
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let (status, body) = get("/api/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not found");
}

#[tokio::test]
async fn health_probes_report_healthy() {
    for uri in ["/api/health", "/api/db-health", "/api/file-service-health"] {
        let (status, body) = get(uri).await;
        assert_eq!(status, StatusCode::OK, "{}", uri);
        assert_eq!(body["status"], "healthy", "{}", uri);
    }
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let request = Request::builder()
        .uri("/api/health")
        .header(header::ORIGIN, "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let (_, headers, _) = send(request).await;
    assert_eq!(
        header_str(&headers, header::ACCESS_CONTROL_ALLOW_ORIGIN),
        "*"
    );
}

// === Image compression ===

#[tokio::test]
async fn image_without_files_field_is_rejected() {
    let request = multipart_request(
        "/api/compress/image",
        &[part("other", "photo.jpg", vec![1, 2, 3])],
    );
    let (status, _, body) = send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "No files provided");
}

#[tokio::test]
async fn single_png_comes_back_as_png() {
    let original = encoded(&gradient(64, 64), ImageFormat::Png);
    let request = multipart_request(
        "/api/compress/image",
        &[part("files", "My Photo.PNG", original.clone())],
    );
    let (status, headers, body) = send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(header_str(&headers, header::CONTENT_TYPE), "image/png");
    assert_eq!(
        header_str(&headers, header::CONTENT_DISPOSITION),
        "attachment; filename=\"compressed_My_Photo.PNG\""
    );
    assert!(body.len() <= original.len());
    assert_eq!(image::guess_format(&body).unwrap(), ImageFormat::Png);
}

#[tokio::test]
async fn single_jpeg_never_grows() {
    let original = encoded(&gradient(64, 48), ImageFormat::Jpeg);
    let request = multipart_request(
        "/api/compress/image",
        &[part("files", "scan.jpeg", original.clone())],
    );
    let (status, headers, body) = send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(header_str(&headers, header::CONTENT_TYPE), "image/jpeg");
    assert!(body.len() <= original.len());
    let decoded = image::load_from_memory(&body).unwrap();
    assert!(decoded.width() <= 64 && decoded.height() <= 48);
}

#[tokio::test]
async fn single_disallowed_extension_is_rejected() {
    let request = multipart_request(
        "/api/compress/image",
        &[part("files", "anim.gif", vec![0; 16])],
    );
    let (status, _, body) = send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "File type not allowed");
}

#[tokio::test]
async fn single_corrupt_image_is_a_server_error() {
    let request = multipart_request(
        "/api/compress/image",
        &[part("files", "broken.jpg", b"definitely not a jpeg".to_vec())],
    );
    let (status, _, body) = send(request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json(&body)["error"].as_str().unwrap().contains("decode"));
}

#[tokio::test]
async fn batch_skips_bad_files_and_zips_the_rest() {
    let request = multipart_request(
        "/api/compress/image",
        &[
            part("files", "a.jpg", encoded(&gradient(40, 30), ImageFormat::Jpeg)),
            part("files", "b.png", encoded(&gradient(32, 32), ImageFormat::Png)),
            part("files", "c.jpg", b"garbage".to_vec()),
            part("files", "d.gif", vec![0; 8]),
        ],
    );
    let (status, headers, body) = send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(header_str(&headers, header::CONTENT_TYPE), "application/zip");
    assert_eq!(
        header_str(&headers, header::CONTENT_DISPOSITION),
        "attachment; filename=\"compressed_images.zip\""
    );

    let mut archive = zip::ZipArchive::new(Cursor::new(body)).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(names, vec!["compressed_a.jpg", "compressed_b.png"]);

    let mut png = Vec::new();
    archive
        .by_name("compressed_b.png")
        .unwrap()
        .read_to_end(&mut png)
        .unwrap();
    assert_eq!(image::guess_format(&png).unwrap(), ImageFormat::Png);
}

#[tokio::test]
async fn batch_with_nothing_usable_is_rejected() {
    let request = multipart_request(
        "/api/compress/image",
        &[
            part("files", "a.jpg", b"garbage".to_vec()),
            part("files", "b.txt", b"text".to_vec()),
        ],
    );
    let (status, _, _) = send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// === PDF compression ===

#[tokio::test]
async fn pdf_requires_file_field() {
    let request = multipart_request(
        "/api/compress/pdf",
        &[part("files", "doc.pdf", pdf_with_raw_image())],
    );
    let (status, _, body) = send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "No file provided");
}

#[tokio::test]
async fn pdf_extension_is_checked() {
    let request = multipart_request(
        "/api/compress/pdf",
        &[part("file", "doc.docx", pdf_with_raw_image())],
    );
    let (status, _, body) = send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "File type not allowed");
}

#[tokio::test]
async fn unreadable_pdf_is_a_server_error() {
    let request = multipart_request(
        "/api/compress/pdf",
        &[part("file", "doc.pdf", b"%PDF-1.4 nothing else".to_vec())],
    );
    let (status, _, body) = send(request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json(&body)["error"].as_str().unwrap().contains("PDF"));
}

#[tokio::test]
async fn pdf_is_recompressed() {
    let original = pdf_with_raw_image();
    let request = multipart_request("/api/compress/pdf", &[part("file", "report.pdf", original.clone())]);
    let (status, headers, body) = send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(header_str(&headers, header::CONTENT_TYPE), "application/pdf");
    assert_eq!(
        header_str(&headers, header::CONTENT_DISPOSITION),
        "attachment; filename=\"compressed_report.pdf\""
    );
    assert!(body.len() < original.len());
    assert_eq!(Document::load_mem(&body).unwrap().get_pages().len(), 1);
}

// === JPEG to PDF ===

#[tokio::test]
async fn jpg_to_pdf_builds_one_page_per_image() {
    let request = multipart_request(
        "/api/convert/jpg-to-pdf",
        &[
            part("files", "one.jpg", encoded(&gradient(80, 60), ImageFormat::Jpeg)),
            part("files", "two.png", encoded(&gradient(40, 80), ImageFormat::Png)),
        ],
    );
    let (status, headers, body) = send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(header_str(&headers, header::CONTENT_TYPE), "application/pdf");
    let disposition = header_str(&headers, header::CONTENT_DISPOSITION);
    assert!(disposition.starts_with("attachment; filename=\"converted_"));
    assert!(disposition.ends_with(".pdf\""));

    assert_eq!(Document::load_mem(&body).unwrap().get_pages().len(), 2);
}

#[tokio::test]
async fn jpg_to_pdf_without_files_is_rejected() {
    let request = multipart_request("/api/convert/jpg-to-pdf", &[]);
    let (status, _, body) = send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body = json(&body);
    assert_eq!(body["error"], "No files provided");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn jpg_to_pdf_with_corrupt_image_fails() {
    let request = multipart_request(
        "/api/convert/jpg-to-pdf",
        &[part("files", "one.jpg", b"not an image".to_vec())],
    );
    let (status, _, body) = send(request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json(&body)["error"], "Conversion failed");
}

#[tokio::test]
async fn jpg_to_pdf_answers_bare_options() {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/convert/jpg-to-pdf")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(request).await;
    assert_eq!(status, StatusCode::OK);
}
