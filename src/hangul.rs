//! Hangul syllable decomposition and a jamo-level similarity score.
//!
//! OCR errors on Korean text are usually a single wrong jamo (`찌` read as `째`),
//! which a syllable-level edit distance counts as a full substitution. The score
//! here compares jamo sequences and charges half a substitution for pairs that
//! OCR engines commonly confuse.

const SYLLABLE_BASE: u32 = 0xAC00;
const SYLLABLE_LAST: u32 = 0xD7A3;
const MEDIAL_COUNT: u32 = 21;
const FINAL_COUNT: u32 = 28;

const INITIALS: [char; 19] = [
    'ㄱ', 'ㄲ', 'ㄴ', 'ㄷ', 'ㄸ', 'ㄹ', 'ㅁ', 'ㅂ', 'ㅃ', 'ㅅ', 'ㅆ', 'ㅇ', 'ㅈ', 'ㅉ', 'ㅊ', 'ㅋ',
    'ㅌ', 'ㅍ', 'ㅎ',
];

const MEDIALS: [char; 21] = [
    'ㅏ', 'ㅐ', 'ㅑ', 'ㅒ', 'ㅓ', 'ㅔ', 'ㅕ', 'ㅖ', 'ㅗ', 'ㅘ', 'ㅙ', 'ㅚ', 'ㅛ', 'ㅜ', 'ㅝ', 'ㅞ',
    'ㅟ', 'ㅠ', 'ㅡ', 'ㅢ', 'ㅣ',
];

// Index 0 is "no final consonant"
const FINALS: [Option<char>; 28] = [
    None,
    Some('ㄱ'),
    Some('ㄲ'),
    Some('ㄳ'),
    Some('ㄴ'),
    Some('ㄵ'),
    Some('ㄶ'),
    Some('ㄷ'),
    Some('ㄹ'),
    Some('ㄺ'),
    Some('ㄻ'),
    Some('ㄼ'),
    Some('ㄽ'),
    Some('ㄾ'),
    Some('ㄿ'),
    Some('ㅀ'),
    Some('ㅁ'),
    Some('ㅂ'),
    Some('ㅄ'),
    Some('ㅅ'),
    Some('ㅆ'),
    Some('ㅇ'),
    Some('ㅈ'),
    Some('ㅊ'),
    Some('ㅋ'),
    Some('ㅌ'),
    Some('ㅍ'),
    Some('ㅎ'),
];

/// Groups of jamo that are visually or acoustically close
const CONFUSABLE_GROUPS: &[&[char]] = &[
    &['ㄱ', 'ㄲ', 'ㅋ'],
    &['ㄷ', 'ㄸ', 'ㅌ', 'ㄹ'],
    &['ㅂ', 'ㅃ', 'ㅍ'],
    &['ㅅ', 'ㅆ'],
    &['ㅈ', 'ㅉ', 'ㅊ'],
    &['ㅇ', 'ㅁ'],
    &['ㅐ', 'ㅔ'],
    &['ㅒ', 'ㅖ'],
    &['ㅏ', 'ㅓ'],
    &['ㅑ', 'ㅕ'],
    &['ㅗ', 'ㅜ'],
    &['ㅛ', 'ㅠ'],
    &['ㅙ', 'ㅞ', 'ㅚ'],
    &['ㅡ', 'ㅢ'],
];

const CONFUSABLE_COST: f64 = 0.5;

/// Position of a jamo inside its syllable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JamoPosition {
    Initial,
    Medial,
    Final,
    /// Not part of a Hangul syllable (Latin, digits, spaces)
    Other,
}

/// One unit of a decomposed string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jamo {
    pub position: JamoPosition,
    pub letter: char,
}

/// Split a precomposed syllable into (initial, medial, optional final)
pub fn decompose(c: char) -> Option<(char, char, Option<char>)> {
    let code = c as u32;
    if !(SYLLABLE_BASE..=SYLLABLE_LAST).contains(&code) {
        return None;
    }
    let index = code - SYLLABLE_BASE;
    let initial = INITIALS[(index / (MEDIAL_COUNT * FINAL_COUNT)) as usize];
    let medial = MEDIALS[((index % (MEDIAL_COUNT * FINAL_COUNT)) / FINAL_COUNT) as usize];
    let last = FINALS[(index % FINAL_COUNT) as usize];
    Some((initial, medial, last))
}

/// Decompose a whole string into jamo; other characters pass through
pub fn to_jamo(text: &str) -> Vec<Jamo> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        match decompose(c) {
            Some((initial, medial, last)) => {
                out.push(Jamo {
                    position: JamoPosition::Initial,
                    letter: initial,
                });
                out.push(Jamo {
                    position: JamoPosition::Medial,
                    letter: medial,
                });
                if let Some(letter) = last {
                    out.push(Jamo {
                        position: JamoPosition::Final,
                        letter,
                    });
                }
            }
            None => out.push(Jamo {
                position: JamoPosition::Other,
                letter: c,
            }),
        }
    }
    out
}

fn are_confusable(a: char, b: char) -> bool {
    CONFUSABLE_GROUPS
        .iter()
        .any(|group| group.contains(&a) && group.contains(&b))
}

fn substitution_cost(a: Jamo, b: Jamo) -> f64 {
    if a == b {
        0.0
    } else if a.position == b.position && are_confusable(a.letter, b.letter) {
        CONFUSABLE_COST
    } else {
        1.0
    }
}

/// Weighted edit distance over jamo sequences
pub fn jamo_distance(a: &str, b: &str) -> f64 {
    let a = to_jamo(a);
    let b = to_jamo(b);

    let mut previous: Vec<f64> = (0..=b.len()).map(|j| j as f64).collect();
    let mut current = vec![0.0; b.len() + 1];

    for (i, ja) in a.iter().enumerate() {
        current[0] = (i + 1) as f64;
        for (j, jb) in b.iter().enumerate() {
            let substitute = previous[j] + substitution_cost(*ja, *jb);
            let delete = previous[j + 1] + 1.0;
            let insert = current[j] + 1.0;
            current[j + 1] = substitute.min(delete).min(insert);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// Jamo similarity in `[0, 1]`, 1.0 for identical strings
///
/// ```rust
/// use menu_nutrition::hangul::jamo_similarity;
///
/// // 째 and 찌 differ in one confusable vowel
/// assert!(jamo_similarity("김치째개", "김치찌개") > jamo_similarity("김치째개", "김치전골"));
/// ```
pub fn jamo_similarity(a: &str, b: &str) -> f64 {
    let longest = to_jamo(a).len().max(to_jamo(b).len());
    if longest == 0 {
        return 1.0;
    }
    (1.0 - jamo_distance(a, b) / longest as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decompose_syllables() {
        assert_eq!(decompose('김'), Some(('ㄱ', 'ㅣ', Some('ㅁ'))));
        assert_eq!(decompose('치'), Some(('ㅊ', 'ㅣ', None)));
        assert_eq!(decompose('가'), Some(('ㄱ', 'ㅏ', None)));
        assert_eq!(decompose('힣'), Some(('ㅎ', 'ㅣ', Some('ㅎ'))));
        assert_eq!(decompose('a'), None);
    }

    #[test]
    fn test_to_jamo_length() {
        // 김(3) 치(2) + space + a
        assert_eq!(to_jamo("김치 a").len(), 7);
    }

    #[test]
    fn test_confusable_substitution_is_cheaper() {
        // ㅐ/ㅔ is a confusable pair
        let confusable = jamo_distance("찌개", "찌게");
        // ㅐ/ㅗ is not
        let unrelated = jamo_distance("찌개", "찌고");
        assert!((confusable - 0.5).abs() < f64::EPSILON);
        assert!((unrelated - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(jamo_similarity("", ""), 1.0);
        assert_eq!(jamo_similarity("비빔밥", "비빔밥"), 1.0);
        assert!(jamo_similarity("비빔밥", "xyz") < 0.5);
    }

    #[test]
    fn test_similarity_is_symmetric() {
        let ab = jamo_similarity("돈까스", "돈가스");
        let ba = jamo_similarity("돈가스", "돈까스");
        assert!((ab - ba).abs() < f64::EPSILON);
    }
}
