use crate::ocr::BBoxPx;

use super::RecognizedWord;

const WORD_LEVEL: i32 = 5;

/// Parses `tesseract ... tsv` output into words, preserving row order.
///
/// Rows below word level and rows with a negative confidence (layout rows
/// tesseract emits for blocks and lines) are skipped.
pub(super) fn parse_tsv_words(tsv: &str) -> Vec<RecognizedWord> {
    let mut words = Vec::new();
    for (idx, row) in tsv.lines().enumerate() {
        if idx == 0 {
            continue;
        }
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 {
            continue;
        }
        let level: i32 = cols[0].parse().unwrap_or(0);
        if level != WORD_LEVEL {
            continue;
        }
        let left: u32 = cols[6].parse().unwrap_or(0);
        let top: u32 = cols[7].parse().unwrap_or(0);
        let width: u32 = cols[8].parse().unwrap_or(0);
        let height: u32 = cols[9].parse().unwrap_or(0);
        let conf: f32 = cols[10].trim().parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || conf < 0.0 {
            continue;
        }
        words.push(RecognizedWord {
            text: text.to_string(),
            bbox: BBoxPx {
                x: left,
                y: top,
                w: width,
                h: height,
            },
            confidence: conf.min(100.0),
        });
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn keeps_word_rows_in_scan_order() {
        let tsv = format!(
            "{HEADER}\n\
             1\t1\t0\t0\t0\t0\t0\t0\t1700\t2200\t-1\t\n\
             4\t1\t1\t1\t1\t0\t100\t100\t400\t30\t-1\t\n\
             5\t1\t1\t1\t1\t1\t100\t100\t120\t30\t96.5\tInvoice\n\
             5\t1\t1\t1\t1\t2\t230\t101\t90\t29\t91\t#1234\n\
             5\t1\t1\t1\t1\t3\t330\t101\t10\t29\t12\t \n"
        );
        let words = parse_tsv_words(&tsv);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "Invoice");
        assert_eq!(words[0].bbox, BBoxPx { x: 100, y: 100, w: 120, h: 30 });
        assert_eq!(words[1].text, "#1234");
        assert_eq!(words[1].confidence, 91.0);
    }

    #[test]
    fn short_rows_are_ignored() {
        let tsv = format!("{HEADER}\n5\t1\t1\n");
        assert!(parse_tsv_words(&tsv).is_empty());
    }
}
