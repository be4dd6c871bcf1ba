use std::io::{Cursor, Read};
use std::sync::Arc;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, StringFormat};

use docfill_rust::document::{DocumentLoader, PdfLoader};
use docfill_rust::generator::{DiagnosticKind, Outcome};
use docfill_rust::{GenerateOptions, GenerationRequest, ReplacementRule, RuleSet, archive};

fn form_pdf(lines: &[(&str, f32, f32)]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
    ]));
    let mut operations = Vec::new();
    for (text, x, y) in lines {
        operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
            Operation::new("Td", vec![Object::Real(*x), Object::Real(*y)]),
            Operation::new(
                "Tj",
                vec![Object::String(text.as_bytes().to_vec(), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ]);
    }
    let content_id = doc.add_object(Stream::new(
        Dictionary::new(),
        Content { operations }.encode().expect("encode"),
    ));
    let page_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Page".to_vec())),
        ("Parent", Object::Reference(pages_id)),
        ("Contents", Object::Reference(content_id)),
        (
            "Resources",
            Object::Dictionary(Dictionary::from_iter(vec![(
                "Font",
                Object::Dictionary(Dictionary::from_iter(vec![("F1", Object::Reference(font_id))])),
            )])),
        ),
        (
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ]),
        ),
    ]));
    doc.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(1)),
            ("Kids", Object::Array(vec![Object::Reference(page_id)])),
        ])),
    );
    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("save");
    buffer
}

fn page_text(bytes: &[u8]) -> String {
    let mut doc = PdfLoader.load(bytes).expect("reload copy");
    doc.pages_mut()
        .into_iter()
        .map(|page| page.extract_text())
        .collect::<Vec<_>>()
        .join("\n")
}

fn options() -> GenerateOptions {
    GenerateOptions {
        copy_workers: 2,
        ..GenerateOptions::default()
    }
}

#[tokio::test]
async fn serial_numbers_replace_the_placeholder_in_each_copy() {
    let source: Arc<[u8]> = Arc::from(form_pdf(&[
        ("Certificate", 72.0, 740.0),
        ("Serial: SERIAL001", 72.0, 700.0),
    ]));
    let rules = RuleSet::from_json(
        r#"[{"original_text": "SERIAL001", "type": "serial", "start_value": 100, "format": "%05d"}]"#,
    )
    .expect("rules");
    let request = GenerationRequest {
        rules,
        num_copies: 3,
        sections: Vec::new(),
        stem: "certificate".to_string(),
    };

    let docs = docfill_rust::generate_copies(options(), source, request)
        .await
        .expect("generate");

    assert_eq!(docs.len(), 3);
    for (doc, expected) in docs.iter().zip(["00100", "00101", "00102"]) {
        let text = page_text(&doc.bytes);
        assert!(text.contains(expected), "copy {} text: {}", doc.index + 1, text);
        assert!(!text.contains("SERIAL001"), "copy {} text: {}", doc.index + 1, text);
        assert!(text.contains("Certificate"));
        assert_eq!(doc.file_name, format!("certificate_copy_{}.pdf", doc.index + 1));
        assert_eq!(doc.report.replaced(), 1);
    }

    let zipped = archive::package("certificate", &docs).expect("package");
    let mut archive = zip::ZipArchive::new(Cursor::new(zipped)).expect("zip");
    assert_eq!(archive.len(), 4);
    let mut manifest = String::new();
    archive
        .by_name(archive::MANIFEST_NAME)
        .expect("manifest")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    let manifest: serde_json::Value = serde_json::from_str(&manifest).expect("json");
    assert_eq!(manifest["copies"][2]["report"]["values"]["SERIAL001"], "00102");
}

#[tokio::test]
async fn absent_placeholder_does_not_block_other_rules_or_copies() {
    let source: Arc<[u8]> = Arc::from(form_pdf(&[("Ticket SERIAL001", 72.0, 700.0)]));
    let request = GenerationRequest {
        rules: RuleSet::new(vec![
            ReplacementRule::serial("NOT-ON-PAGE", 1),
            ReplacementRule::serial("SERIAL001", 7),
        ])
        .expect("rules"),
        num_copies: 2,
        sections: Vec::new(),
        stem: "ticket".to_string(),
    };

    let docs = docfill_rust::generate_copies(options(), source, request)
        .await
        .expect("generate");

    assert_eq!(docs.len(), 2);
    assert!(page_text(&docs[0].bytes).contains('7'));
    assert!(page_text(&docs[1].bytes).contains('8'));
    for doc in &docs {
        assert_eq!(doc.report.missing(), vec!["NOT-ON-PAGE"]);
        assert!(
            doc.report
                .all_diagnostics()
                .any(|d| d.kind == DiagnosticKind::PerInstanceMatchFailure && d.rule == 0)
        );
        let outcomes: Vec<_> = doc.report.statuses().map(|s| s.outcome).collect();
        assert_eq!(outcomes, vec![Outcome::NotFound, Outcome::Replaced]);
    }
}

#[tokio::test]
async fn repeated_placeholder_on_one_line_keeps_every_wider_value_intact() {
    let source: Arc<[u8]> = Arc::from(form_pdf(&[("ID AB AB end", 72.0, 700.0)]));
    let request = GenerationRequest {
        rules: RuleSet::new(vec![ReplacementRule {
            format: Some("%08d".to_string()),
            ..ReplacementRule::serial("AB", 12345678)
        }])
        .expect("rules"),
        num_copies: 1,
        sections: Vec::new(),
        stem: "ids".to_string(),
    };

    let docs = docfill_rust::generate_copies(options(), source, request)
        .await
        .expect("generate");

    let text = page_text(&docs[0].bytes);
    assert_eq!(text.matches("12345678").count(), 2, "{}", text);
    assert!(!text.contains("AB"), "{}", text);
    assert_eq!(docs[0].report.replaced(), 2);
    assert_eq!(docs[0].report.all_diagnostics().count(), 0);
}

#[test]
fn duplicate_placeholders_are_rejected_up_front() {
    let err = RuleSet::new(vec![
        ReplacementRule::serial("SERIAL001", 1),
        ReplacementRule::serial("SERIAL001", 5),
    ])
    .expect_err("duplicate");
    assert!(matches!(err, docfill_rust::EngineError::InvalidRules(_)));
}
