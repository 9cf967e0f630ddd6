use ghost::state::ThinkFilter;

fn filter_all<S: AsRef<str>>(tokens: &[S]) -> (String, String) {
    let mut filter = ThinkFilter::new();
    let mut out = String::new();
    for token in tokens {
        if let Some(text) = filter.push(token.as_ref()) {
            out.push_str(&text);
        }
    }
    if let Some(text) = filter.flush() {
        out.push_str(&text);
    }
    (out, filter.full_text().to_string())
}

/// Remove every closed `<think>...</think>` region, then left-trim ASCII
/// whitespace.
fn expected(input: &str) -> String {
    let mut rest = input;
    let mut kept = String::new();
    while let Some(open) = rest.find("<think>") {
        let after_open = &rest[open + "<think>".len()..];
        match after_open.find("</think>") {
            Some(close) => {
                kept.push_str(&rest[..open]);
                rest = &after_open[close + "</think>".len()..];
            }
            None => break,
        }
    }
    kept.push_str(rest);
    kept.trim_start_matches([' ', '\t', '\n', '\r']).to_string()
}

fn boundaries(text: &str) -> Vec<usize> {
    text.char_indices().map(|(idx, _)| idx).skip(1).collect()
}

const SAMPLES: &[&str] = &[
    "<think>hidden</think>Hello",
    "  <think>a</think>\n\nAnswer: 42",
    "Before <think>mid</think> after",
    "<think>one</think>x<think>two</think>y",
    "plain text with < and > and </think> stray",
    "  \n\tHello, world",
    "a < b <thin <thinker> c",
    "<think>é</think>café",
];

#[test]
fn test_single_token_think_block() {
    let (out, full) = filter_all(&["<think>hidden</think>Hello"]);
    assert_eq!(out, "Hello");
    assert_eq!(full, "<think>hidden</think>Hello");
}

#[test]
fn test_tags_split_across_tokens() {
    let (out, _) = filter_all(&[
        "<", "think", ">", "reasoning", "</", "think", ">", "Response",
    ]);
    assert_eq!(out, "Response");
}

#[test]
fn test_leading_whitespace_without_think_block() {
    let (out, _) = filter_all(&["  \n\t", "Hello, ", "world"]);
    assert_eq!(out, "Hello, world");
}

#[test]
fn test_unterminated_think_block() {
    let (out, full) = filter_all(&["<think>", "incomplete"]);
    assert_eq!(out, "");
    assert_eq!(full, "<think>incomplete");
}

#[test]
fn test_partial_open_tag_at_end_is_emitted_verbatim() {
    let (out, _) = filter_all(&["Hi ", "<thi"]);
    assert_eq!(out, "Hi <thi");
}

#[test]
fn test_output_independent_of_two_way_splits() {
    for sample in SAMPLES {
        let want = expected(sample);
        for cut in boundaries(sample) {
            let (out, full) = filter_all(&[&sample[..cut], &sample[cut..]]);
            assert_eq!(out, want, "sample {sample:?} split at {cut}");
            assert_eq!(&full, sample);
        }
    }
}

#[test]
fn test_output_independent_of_three_way_splits() {
    for sample in SAMPLES {
        let want = expected(sample);
        let cuts = boundaries(sample);
        for (i, &a) in cuts.iter().enumerate() {
            for &b in &cuts[i + 1..] {
                let (out, _) = filter_all(&[&sample[..a], &sample[a..b], &sample[b..]]);
                assert_eq!(out, want, "sample {sample:?} split at {a},{b}");
            }
        }
    }
}

#[test]
fn test_char_by_char_stream() {
    for sample in SAMPLES {
        let tokens: Vec<String> = sample.chars().map(String::from).collect();
        let (out, _) = filter_all(&tokens);
        assert_eq!(out, expected(sample), "sample {sample:?}");
    }
}

#[test]
fn test_fresh_filter_per_stream_after_reset() {
    let mut filter = ThinkFilter::new();
    assert_eq!(filter.push("<think>x"), None);
    filter.reset();
    assert_eq!(filter.push("  ok").as_deref(), Some("ok"));
    assert_eq!(filter.full_text(), "  ok");
}
