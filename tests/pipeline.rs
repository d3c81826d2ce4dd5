//! End-to-end tests for the scan/parse/emit pipeline.
//!
//! These drive the public API the way an embedding application would: pull
//! tokens from a Scanner, pull events from a Parser, and push events into
//! an Emitter, asserting on the concrete streams and rendered text.

use yamlet::{
    emit_to_string, parse_events, CollectionStyle, EmitOptions, Emitter, Encoding, Event,
    EventData, Output, Parser, ScalarStyle, Scanner, TokenData,
};

/// Drain a scanner into the list of token kinds.
fn scan_all(input: &str) -> Vec<TokenData> {
    let mut scanner = Scanner::new(input);
    let mut kinds = Vec::new();
    loop {
        let token = scanner.next_token().expect("scan failed");
        let done = token.data == TokenData::StreamEnd;
        kinds.push(token.data);
        if done {
            return kinds;
        }
    }
}

#[test]
fn test_mapping_token_stream_matches_grammar() {
    let kinds = scan_all("key: value");
    assert_eq!(
        kinds,
        vec![
            TokenData::StreamStart {
                encoding: Encoding::Utf8
            },
            TokenData::BlockMappingStart,
            TokenData::Key,
            TokenData::Scalar {
                value: "key".to_string(),
                style: ScalarStyle::Plain
            },
            TokenData::Value,
            TokenData::Scalar {
                value: "value".to_string(),
                style: ScalarStyle::Plain
            },
            TokenData::BlockEnd,
            TokenData::StreamEnd,
        ]
    );
}

#[test]
fn test_sequence_event_stream_matches_grammar() {
    let events = parse_events("- 1\n- 2\n").expect("parse failed");
    let kinds: Vec<&EventData> = events.iter().map(|e| &e.data).collect();
    assert!(matches!(kinds[0], EventData::StreamStart { .. }));
    assert!(matches!(
        kinds[1],
        EventData::DocumentStart { implicit: true, .. }
    ));
    assert!(matches!(
        kinds[2],
        EventData::SequenceStart {
            style: CollectionStyle::Block,
            ..
        }
    ));
    assert!(matches!(kinds[3], EventData::Scalar { value, .. } if value == "1"));
    assert!(matches!(kinds[4], EventData::Scalar { value, .. } if value == "2"));
    assert!(matches!(kinds[5], EventData::SequenceEnd));
    assert!(matches!(
        kinds[6],
        EventData::DocumentEnd { implicit: true }
    ));
    assert!(matches!(kinds[7], EventData::StreamEnd));
}

#[test]
fn test_empty_mapping_renders_as_braces() {
    let text = emit_to_string(vec![
        Event::stream_start(Encoding::Utf8),
        Event::document_start(None, Vec::new(), true),
        Event::mapping_start(CollectionStyle::Block),
        Event::mapping_end(),
        Event::document_end(true),
        Event::stream_end(),
    ])
    .expect("emit failed");
    assert_eq!(text, "{}\n");
}

#[test]
fn test_literal_with_break_in_flow_downgrades() {
    let text = emit_to_string(vec![
        Event::stream_start(Encoding::Utf8),
        Event::document_start(None, Vec::new(), true),
        Event::sequence_start(CollectionStyle::Flow),
        Event::scalar("a\nb", ScalarStyle::Literal),
        Event::sequence_end(),
        Event::document_end(true),
        Event::stream_end(),
    ])
    .expect("emit failed");
    assert_eq!(text, "[\"a\\nb\"]\n");
}

#[test]
fn test_offside_rule_closes_collections_on_dedent() {
    // The nested mapping opened at column 2 must close exactly when the
    // first line at a lower column appears, and the outer one at the end.
    let kinds = scan_all("a:\n  b: 1\nc: 2\n");
    let positions: Vec<usize> = kinds
        .iter()
        .enumerate()
        .filter(|(_, k)| **k == TokenData::BlockEnd)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(positions.len(), 2);
    // The inner BLOCK-END must come before the 'c' key scalar.
    let c_index = kinds
        .iter()
        .position(|k| {
            matches!(k, TokenData::Scalar { value, .. } if value == "c")
        })
        .expect("scalar c missing");
    assert!(positions[0] < c_index);
}

#[test]
fn test_plain_multiline_scalars_fold_into_one_token() {
    let kinds = scan_all("key: word one\n  word two\n");
    assert!(kinds.contains(&TokenData::Scalar {
        value: "word one word two".to_string(),
        style: ScalarStyle::Plain
    }));
}

#[test]
fn test_multi_document_stream_with_directives() {
    let input = "%YAML 1.1\n---\nfirst\n...\n%TAG !e! tag:example.com,2000:\n---\n!e!x second\n";
    let events = parse_events(input).expect("parse failed");
    let scalars: Vec<&EventData> = events
        .iter()
        .map(|e| &e.data)
        .filter(|d| matches!(d, EventData::Scalar { .. }))
        .collect();
    assert_eq!(scalars.len(), 2);
    assert!(matches!(
        scalars[1],
        EventData::Scalar { tag: Some(tag), .. } if tag == "tag:example.com,2000:x"
    ));
    // The first document was closed explicitly, the second implicitly.
    let ends: Vec<bool> = events
        .iter()
        .filter_map(|e| match e.data {
            EventData::DocumentEnd { implicit } => Some(implicit),
            _ => None,
        })
        .collect();
    assert_eq!(ends, vec![false, true]);
}

#[test]
fn test_error_messages_carry_positions() {
    let mut parser = Parser::new("key: [a, b\nnext: x\n");
    let error = loop {
        match parser.next_event() {
            Ok(_) => continue,
            Err(error) => break error,
        }
    };
    let text = error.to_string();
    assert!(
        text.contains("line") && text.contains("column"),
        "error lacks position: {}",
        text
    );
}

#[test]
fn test_streaming_input_source() {
    use std::io::Cursor;
    let input = yamlet::Input::from_stream(Cursor::new(b"stream: works\n".to_vec()));
    let events = parse_events(input).expect("parse failed");
    assert!(events.iter().any(|e| matches!(
        &e.data,
        EventData::Scalar { value, .. } if value == "works"
    )));
}

#[test]
fn test_utf16_input_decodes_to_same_events() {
    let text = "name: caf\u{E9}\n";
    let mut bytes = vec![0xFF, 0xFE];
    for unit in text.encode_utf16() {
        bytes.extend(unit.to_le_bytes());
    }
    let from_utf16 = parse_events(bytes).expect("utf16 parse failed");
    let from_utf8 = parse_events(text).expect("utf8 parse failed");
    let values = |events: &[Event]| -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match &e.data {
                EventData::Scalar { value, .. } => Some(value.clone()),
                _ => None,
            })
            .collect()
    };
    assert_eq!(values(&from_utf16), values(&from_utf8));
}

#[test]
fn test_emitter_writes_through_callback_sink() {
    use std::cell::RefCell;
    use std::rc::Rc;

    let collected: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&collected);
    let output = Output::from_callback(move |chunk| {
        sink.borrow_mut().extend_from_slice(chunk);
        Ok(())
    });

    let mut emitter = Emitter::new(output);
    for event in [
        Event::stream_start(Encoding::Utf8),
        Event::document_start(None, Vec::new(), true),
        Event::scalar("sink", ScalarStyle::Plain),
        Event::document_end(true),
        Event::stream_end(),
    ] {
        emitter.emit(event).expect("emit failed");
    }
    assert_eq!(collected.borrow().as_slice(), b"sink\n");
}

#[test]
fn test_block_scalars_survive_the_pipeline() {
    let input = "log: |\n  line one\n  line two\n";
    let events = parse_events(input).expect("parse failed");
    assert!(events.iter().any(|e| matches!(
        &e.data,
        EventData::Scalar { value, style: ScalarStyle::Literal, .. }
            if value == "line one\nline two\n"
    )));
    let text = emit_to_string(events).expect("emit failed");
    assert_eq!(text, input);
}

#[test]
fn test_width_folding_of_long_flow_sequences() {
    let items: Vec<Event> = (0..30)
        .map(|i| Event::scalar(format!("item{}", i), ScalarStyle::Plain))
        .collect();
    let mut events = vec![
        Event::stream_start(Encoding::Utf8),
        Event::document_start(None, Vec::new(), true),
        Event::sequence_start(CollectionStyle::Flow),
    ];
    events.extend(items);
    events.push(Event::sequence_end());
    events.push(Event::document_end(true));
    events.push(Event::stream_end());
    let text = yamlet::emit_to_string_with(events, EmitOptions::new().with_width(40))
        .expect("emit failed");
    assert!(text.lines().count() > 1, "no folding happened: {:?}", text);
    for line in text.lines() {
        assert!(
            line.len() <= 48,
            "line exceeds width by more than one item: {:?}",
            line
        );
    }
}

#[test]
fn test_comment_handling_matches_plain_scalar_rules() {
    // '#' preceded by whitespace starts a comment; '#' inside a word in
    // progress does not.
    let events = parse_events("a: b#c\nd: e # real comment\n").expect("parse failed");
    let values: Vec<&str> = events
        .iter()
        .filter_map(|e| match &e.data {
            EventData::Scalar { value, .. } => Some(value.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(values, vec!["a", "b#c", "d", "e"]);
}
