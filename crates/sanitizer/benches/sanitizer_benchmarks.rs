use criterion::{black_box, criterion_group, criterion_main, Criterion};
use bastion_sanitizer::{SanitizeOptions, Sanitizer};

fn sanitize_simple_message(c: &mut Criterion) {
    let sanitizer = Sanitizer::builtin();
    let options = SanitizeOptions::default();

    let html = r#"
        <html>
            <head>
                <title>Weekly report</title>
            </head>
            <body>
                <h1>Hello, World!</h1>
                <p>This is a test message with some <strong>bold text</strong> and a <a href="https://example.com">link</a>.</p>
                <div class="container" style="color: #333; margin: 0 auto">
                    <ul>
                        <li>Item 1</li>
                        <li>Item 2</li>
                        <li>Item 3</li>
                    </ul>
                </div>
            </body>
        </html>
    "#;

    c.bench_function("sanitize_simple_message", |b| {
        b.iter(|| {
            sanitizer.sanitize(black_box(html), &options).unwrap();
        })
    });
}

fn sanitize_hostile_message(c: &mut Criterion) {
    let sanitizer = Sanitizer::builtin();
    let options = SanitizeOptions {
        drop_external_images: true,
        css_prefix: Some("msg".to_string()),
        ..SanitizeOptions::default()
    };

    let html = r#"
        <html>
            <head>
                <title>Complex Test</title>
                <script>alert('xss');</script>
                <style>body { color: red; } p { behavior: url(x.htc) }</style>
            </head>
            <body>
                <div class="container" onclick="alert('click')">
                    <iframe src="http://evil.com"></iframe>
                    <img src="http://tracker.example/pixel.gif" onerror="alert('error')">
                    <form action="http://evil.com">
                        <input type="text" name="test">
                        <button onclick="submit()">Submit</button>
                    </form>
                    <a href="java&#x09;script:alert('click')">Click me</a>
                    <p style="background: url(http://tracker.example/bg.png); width: expression(1)">x</p>
                    <<SCRIPT>alert("XSS")//<</SCRIPT>
                    %3cscript%3ealert(1)%3c/script%3e
                    <o:p>word markup</o:p>
                </div>
            </body>
        </html>
    "#;

    c.bench_function("sanitize_hostile_message", |b| {
        b.iter(|| {
            sanitizer.sanitize(black_box(html), &options).unwrap();
        })
    });
}

fn check_inline_css(c: &mut Criterion) {
    let sanitizer = Sanitizer::builtin();
    let css = "font: italic bold 12px/30px Georgia, serif; border: 1px solid #ccc; \
               color: rgb(10, 20, 30); behavior: url(x.htc); margin: 0 auto !important";

    c.bench_function("check_inline_css", |b| {
        b.iter(|| sanitizer.check_css(black_box(css), None))
    });
}

criterion_group!(benches, sanitize_simple_message, sanitize_hostile_message, check_inline_css);
criterion_main!(benches);
