use criterion::{black_box, criterion_group, criterion_main, Criterion};
use netpipe::http::Headers;

fn response_headers() -> Headers {
    let mut headers = Headers::new();
    headers.insert("Content-Type", "application/json; charset=utf-8").unwrap();
    headers.insert("Content-Length", "18342").unwrap();
    headers.insert("Cache-Control", "private, max-age=0").unwrap();
    headers.insert("Date", "Sat, 17 Oct 2026 09:12:44 GMT").unwrap();
    headers.insert("ETag", "\"5f1c-2a9b7e\"").unwrap();
    headers
        .append("Set-Cookie", "sid=xxxxxxxxxxxxxxxxxxxx; Path=/; HttpOnly")
        .unwrap();
    headers
        .append("Set-Cookie", "theme=dark; Path=/; Max-Age=31536000")
        .unwrap();
    headers.insert("Vary", "Accept-Encoding").unwrap();
    headers.insert("X-Cache-Date", "1792142364000").unwrap();
    headers
}

fn benchmark_multiline_round_trip(c: &mut Criterion) {
    let headers = response_headers();
    let text = headers.to_multiline();

    // The cache persists headers in this form for every stored response
    c.bench_function("headers_to_multiline", |b| {
        b.iter(|| black_box(&headers).to_multiline())
    });
    c.bench_function("headers_parse_multiline", |b| {
        b.iter(|| Headers::parse_multiline(black_box(&text)))
    });
}

fn benchmark_headers_insert(c: &mut Criterion) {
    c.bench_function("headers_insert", |b| {
        b.iter(|| {
            let mut headers = Headers::new();
            headers.insert("Host", "api.example.com").unwrap();
            headers.insert("User-Agent", "netpipe/0.1.0").unwrap();
            headers.insert("Connection", "Keep-Alive").unwrap();
            headers.insert_if_absent("Accept-Encoding", "gzip").unwrap();
            black_box(headers)
        })
    });
}

fn benchmark_charset(c: &mut Criterion) {
    let headers = response_headers();
    c.bench_function("headers_charset", |b| {
        b.iter(|| black_box(&headers).charset().map(str::len))
    });
}

criterion_group!(
    benches,
    benchmark_multiline_round_trip,
    benchmark_headers_insert,
    benchmark_charset
);
criterion_main!(benches);
