// ============================================================
// Layer 4 — BIO / BIOES Span Codec
// ============================================================
// Converts between the span view and the token-tag view of a
// sentence annotation.
//
//   spans:  [0..2) LOC, [3..4) PER
//   BIOES:  B-LOC E-LOC O S-PER
//   IOB1:   B-LOC I-LOC O B-PER      (file output only)
//
// Decoding is lenient and never fails: an I-/E- tag that does
// not continue an open span of the same type starts a new span,
// and a bare tag without a prefix ("PER") is read as I-PER.
//
// Reference: Ramshaw & Marcus (1995) Text Chunking
//            Ratinov & Roth (2009) BIOES encoding

use crate::domain::sentence::{Sentence, Span, TagColumn};

// ─── Tag parsing ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prefix {
    Outside,
    Begin,
    Inside,
    End,
    Single,
}

#[derive(Debug, Clone, Copy)]
struct ParsedTag<'a> {
    prefix:      Prefix,
    entity_type: &'a str,
}

impl<'a> ParsedTag<'a> {
    fn parse(tag: &'a str) -> Self {
        let tag = tag.trim();
        if tag.is_empty() || tag == "O" || tag == "_" {
            return Self { prefix: Prefix::Outside, entity_type: "" };
        }
        let bytes = tag.as_bytes();
        if bytes.len() > 2 && (bytes[1] == b'-' || bytes[1] == b'_') {
            let prefix = match bytes[0].to_ascii_uppercase() {
                b'B'        => Some(Prefix::Begin),
                b'I'        => Some(Prefix::Inside),
                b'E' | b'L' => Some(Prefix::End),
                b'S' | b'U' => Some(Prefix::Single),
                _           => None,
            };
            if let Some(prefix) = prefix {
                return Self { prefix, entity_type: &tag[2..] };
            }
        }
        Self { prefix: Prefix::Inside, entity_type: tag }
    }
}

/// Entity type of a tag (`B-LOC` → `LOC`); `None` for `O`.
pub fn entity_type(tag: &str) -> Option<&str> {
    let parsed = ParsedTag::parse(tag);
    match parsed.prefix {
        Prefix::Outside => None,
        _ => Some(parsed.entity_type),
    }
}

// ─── Encode ───────────────────────────────────────────────────────────────────
/// BIOES tags for the spans of `column`. Spans must not overlap.
pub fn encode(sentence: &Sentence, column: TagColumn) -> Vec<String> {
    let mut tags = vec!["O".to_string(); sentence.len()];
    for span in sentence.spans(column) {
        if span.is_empty() || span.end > tags.len() {
            continue;
        }
        if span.len() == 1 {
            tags[span.start] = format!("S-{}", span.value);
            continue;
        }
        tags[span.start] = format!("B-{}", span.value);
        for tag in &mut tags[span.start + 1..span.end - 1] {
            *tag = format!("I-{}", span.value);
        }
        tags[span.end - 1] = format!("E-{}", span.value);
    }
    tags
}

/// Encode the spans of `spans_from` and store them as token tags of `tags_into`.
pub fn encode_into(sentence: &mut Sentence, spans_from: TagColumn, tags_into: TagColumn) {
    let tags = encode(sentence, spans_from);
    sentence.set_tags(tags_into, &tags);
}

// ─── Decode ───────────────────────────────────────────────────────────────────
/// Spans described by a BIO/BIOES tag sequence.
pub fn decode<S: AsRef<str>>(tags: &[S]) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut open: Option<(usize, &str)> = None;

    fn close(spans: &mut Vec<Span>, open: &mut Option<(usize, &str)>, end: usize) {
        if let Some((start, value)) = open.take() {
            spans.push(Span::new(start, end, value));
        }
    }

    for (i, tag) in tags.iter().enumerate() {
        let parsed = ParsedTag::parse(tag.as_ref());
        match parsed.prefix {
            Prefix::Outside => close(&mut spans, &mut open, i),
            Prefix::Begin => {
                close(&mut spans, &mut open, i);
                open = Some((i, parsed.entity_type));
            }
            Prefix::Single => {
                close(&mut spans, &mut open, i);
                spans.push(Span::new(i, i + 1, parsed.entity_type));
            }
            Prefix::Inside | Prefix::End => {
                let continues = matches!(open, Some((_, ty)) if ty == parsed.entity_type);
                if !continues {
                    close(&mut spans, &mut open, i);
                    open = Some((i, parsed.entity_type));
                }
                if parsed.prefix == Prefix::End {
                    close(&mut spans, &mut open, i + 1);
                }
            }
        }
    }
    close(&mut spans, &mut open, tags.len());
    spans
}

/// Decode the token tags of `tags_from` and store the result as spans of `spans_into`.
pub fn decode_into(sentence: &mut Sentence, tags_from: TagColumn, spans_into: TagColumn) {
    let spans = decode(&sentence.tags(tags_from));
    sentence.set_spans(spans_into, spans);
}

// ─── IOB1 rewrite ─────────────────────────────────────────────────────────────
/// `S-` → `B-` and `E-` → `I-`; everything else unchanged.
pub fn rewrite_to_iob1<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    tags.iter()
        .map(|t| {
            let t = t.as_ref();
            if let Some(rest) = t.strip_prefix("S-") {
                format!("B-{rest}")
            } else if let Some(rest) = t.strip_prefix("E-") {
                format!("I-{rest}")
            } else {
                t.to_string()
            }
        })
        .collect()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn sentence_with(spans: Vec<Span>, len: usize) -> Sentence {
        let mut s = Sentence::new(0, (0..len).map(|i| format!("w{i}")));
        s.set_spans(TagColumn::Observed, spans);
        s
    }

    #[test]
    fn test_encode_bioes() {
        let s = sentence_with(
            vec![Span::new(0, 3, "ORG"), Span::new(4, 5, "PER"), Span::new(5, 7, "LOC")],
            7,
        );
        assert_eq!(
            encode(&s, TagColumn::Observed),
            vec!["B-ORG", "I-ORG", "E-ORG", "O", "S-PER", "B-LOC", "E-LOC"]
        );
    }

    #[test]
    fn test_round_trip_reproduces_spans() {
        let spans = vec![Span::new(0, 1, "PER"), Span::new(1, 4, "ORG"), Span::new(6, 8, "PER")];
        let s = sentence_with(spans.clone(), 9);
        assert_eq!(decode(&encode(&s, TagColumn::Observed)), spans);
    }

    #[test]
    fn test_single_token_span_equivalence() {
        assert_eq!(decode(&["S-LOC"]), vec![Span::new(0, 1, "LOC")]);
        assert_eq!(decode(&["B-LOC", "O"]), vec![Span::new(0, 1, "LOC")]);
    }

    #[test]
    fn test_orphan_inside_starts_span() {
        assert_eq!(
            decode(&["O", "I-PER", "I-PER", "O"]),
            vec![Span::new(1, 3, "PER")]
        );
        // type change inside a run starts a new span
        assert_eq!(
            decode(&["B-PER", "I-LOC", "E-LOC"]),
            vec![Span::new(0, 1, "PER"), Span::new(1, 3, "LOC")]
        );
    }

    #[test]
    fn test_iob2_and_iob1_inputs() {
        assert_eq!(
            decode(&["B-PER", "I-PER", "B-PER", "O"]),
            vec![Span::new(0, 2, "PER"), Span::new(2, 3, "PER")]
        );
        assert_eq!(decode(&["I-ORG", "I-ORG"]), vec![Span::new(0, 2, "ORG")]);
    }

    #[test]
    fn test_mask_tag_decodes_as_span() {
        assert_eq!(
            decode(&["O", "S-MASK", "B-LOC", "E-LOC"]),
            vec![Span::new(1, 2, "MASK"), Span::new(2, 4, "LOC")]
        );
    }

    #[test]
    fn test_rewrite_to_iob1() {
        assert_eq!(
            rewrite_to_iob1(&["S-PER", "B-LOC", "I-LOC", "E-LOC", "O"]),
            vec!["B-PER", "B-LOC", "I-LOC", "I-LOC", "O"]
        );
    }

    #[test]
    fn test_entity_type() {
        assert_eq!(entity_type("B-LOC"), Some("LOC"));
        assert_eq!(entity_type("S-MASK"), Some("MASK"));
        assert_eq!(entity_type("O"), None);
    }
}
