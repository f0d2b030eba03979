use std::io::{self, Read};
use std::sync::{Arc, Mutex};
use std::thread;

use markloom_core::{Document, DocumentError, Highlighter};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Clone, Default)]
struct RecordingHighlighter {
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl Highlighter for RecordingHighlighter {
    fn highlight(&self, code: &str, language: &str, out: &mut String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((code.to_string(), language.to_string()));
        }
        out.push_str("[highlighted]");
    }
}

#[test]
fn highlighter_sees_each_fenced_block_once() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();
    let recorder = RecordingHighlighter::default();
    let mut document = Document::new().with_highlighter(recorder.clone());
    document.read("```rust extra words\nfn a() {}\n```\n\n```\nplain\n```\n\n~~~ js\nx\n~~~\n")?;

    let first = document.to_html();
    let second = document.to_html();
    assert_eq!(first, second);
    assert_eq!(
        first,
        "<pre><code class=\"language-rust\">[highlighted]</code></pre>\n\
         <pre><code>plain\n</code></pre>\n\
         <pre><code class=\"language-js\">[highlighted]</code></pre>\n"
    );

    let calls = recorder.calls.lock().map_err(|_| "poisoned")?.clone();
    // Rendering twice highlights twice; each render asks once per block.
    assert_eq!(
        calls,
        vec![
            ("fn a() {}\n".to_string(), "rust".to_string()),
            ("x\n".to_string(), "js".to_string()),
            ("fn a() {}\n".to_string(), "rust".to_string()),
            ("x\n".to_string(), "js".to_string()),
        ]
    );
    Ok(())
}

#[test]
fn read_after_render_fails_without_changing_output() -> Result<(), Box<dyn std::error::Error>> {
    let mut document = Document::new();
    document.read("before")?;
    let mut out = Vec::new();
    document.write(&mut out)?;
    assert_eq!(String::from_utf8(out)?, "<p>before</p>\n");

    assert!(matches!(
        document.read("after"),
        Err(DocumentError::AlreadyProcessed)
    ));
    assert!(matches!(
        document.read_from("after".as_bytes()),
        Err(DocumentError::AlreadyProcessed)
    ));
    assert_eq!(document.to_html(), "<p>before</p>\n");
    Ok(())
}

#[test]
fn stream_errors_are_reported() {
    struct Broken;
    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("disk on fire"))
        }
    }

    let mut document = Document::new();
    let err = document.read_from(Broken).unwrap_err();
    assert!(matches!(err, DocumentError::Io(_)));
    assert!(err.to_string().contains("disk on fire"));
    assert!(!document.is_processed());
}

#[test]
fn invalid_utf8_is_replaced() -> Result<(), Box<dyn std::error::Error>> {
    let mut document = Document::new();
    document.read_from(&b"caf\xff"[..])?;
    assert_eq!(document.to_html(), "<p>caf\u{fffd}</p>\n");
    Ok(())
}

#[test]
fn line_endings_are_normalized() -> Result<(), Box<dyn std::error::Error>> {
    let mut document = Document::new();
    document.read("a\r\nb\rc\n\rd")?;
    assert_eq!(document.to_html(), "<p>a\nb\nc\nd</p>\n");
    Ok(())
}

#[test]
fn processed_documents_render_from_many_threads() -> Result<(), Box<dyn std::error::Error>> {
    let mut document = Document::new();
    document.read("# Shared\n\n*text*\n")?;
    let expected = document.to_html();
    let document = Arc::new(document);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let document = Arc::clone(&document);
            thread::spawn(move || document.render())
        })
        .collect();
    for handle in handles {
        let rendered = handle.join().map_err(|_| "render thread panicked")?;
        assert_eq!(rendered.as_deref(), Some(expected.as_str()));
    }
    Ok(())
}

#[test]
fn reference_definitions_are_collected() -> Result<(), Box<dyn std::error::Error>> {
    let mut document = Document::new();
    document.read("[A]: /first\n[a]: /second 'Second'\n\n[a]\n")?;
    let html = document.to_html();
    assert_eq!(html, "<p><a href=\"/second\" title=\"Second\">a</a></p>\n");

    let target = document.links().find("A").ok_or("missing link")?;
    assert_eq!(target.url, "/second");
    assert_eq!(document.links().len(), 1);
    Ok(())
}
