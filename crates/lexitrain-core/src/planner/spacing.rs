//! Ordering policy for a packed session.
//!
//! Places new-word introductions among reviews, inserts follow-up drills,
//! then rotates items until no word repeats inside the spacing window.

use serde::{Deserialize, Serialize};

use super::{ExerciseItem, ItemOrigin};

/// No word may appear twice inside any run of this many consecutive items.
pub const SPACING_WINDOW: usize = 3;

/// Distance between an introduction and its follow-up drill.
const FOLLOWUP_GAP: usize = SPACING_WINDOW + 1;

/// Where introductions go relative to reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewWordsPosition {
    Start,
    End,
    /// A few reviews, then one new word, repeated.
    #[default]
    Middle,
}

impl std::str::FromStr for NewWordsPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "start" => Ok(NewWordsPosition::Start),
            "end" => Ok(NewWordsPosition::End),
            "middle" => Ok(NewWordsPosition::Middle),
            other => Err(format!("unknown new_words_position '{other}'")),
        }
    }
}

/// Merge reviews and introductions according to `position`.
pub fn interleave(
    reviews: Vec<ExerciseItem>,
    intros: Vec<ExerciseItem>,
    position: NewWordsPosition,
    reviews_between_new: usize,
) -> Vec<ExerciseItem> {
    let mut out = Vec::with_capacity(reviews.len() + intros.len());
    match position {
        NewWordsPosition::Start => {
            out.extend(intros);
            out.extend(reviews);
        }
        NewWordsPosition::End => {
            out.extend(reviews);
            out.extend(intros);
        }
        NewWordsPosition::Middle => {
            let step = reviews_between_new.max(1);
            let mut reviews = reviews.into_iter().peekable();
            let mut intros = intros.into_iter();
            loop {
                let before = out.len();
                out.extend(reviews.by_ref().take(step));
                if reviews.peek().is_none() && out.len() == before {
                    break;
                }
                match intros.next() {
                    Some(intro) => out.push(intro),
                    None => {
                        out.extend(reviews.by_ref());
                        break;
                    }
                }
            }
            out.extend(intros);
        }
    }
    out
}

/// Insert each follow-up `FOLLOWUP_GAP` slots after its introduction,
/// clamped to the end of the sequence.
pub fn place_followups(items: &mut Vec<ExerciseItem>, followups: Vec<ExerciseItem>) {
    for followup in followups {
        let intro_at = items
            .iter()
            .position(|i| i.word_id == followup.word_id && i.origin == ItemOrigin::New);
        let Some(intro_at) = intro_at else {
            continue;
        };
        let at = (intro_at + FOLLOWUP_GAP).min(items.len());
        items.insert(at, followup);
    }
}

fn conflicts_at(items: &[ExerciseItem], candidate: &ExerciseItem, at: usize) -> bool {
    let from = at.saturating_sub(SPACING_WINDOW - 1);
    items[from..at].iter().any(|i| i.word_id == candidate.word_id)
}

/// A follow-up may never move in front of its own introduction.
fn can_swap(items: &[ExerciseItem], i: usize, j: usize) -> bool {
    let early = &items[i];
    let late = &items[j];
    if conflicts_at(items, late, i) {
        return false;
    }
    if late.origin == ItemOrigin::FollowUp {
        let intro_before = items[..i]
            .iter()
            .any(|x| x.word_id == late.word_id && x.origin == ItemOrigin::New);
        if !intro_before {
            return false;
        }
    }
    if early.origin == ItemOrigin::New {
        let followup_between = items[i + 1..=j]
            .iter()
            .any(|x| x.word_id == early.word_id && x.origin == ItemOrigin::FollowUp);
        if followup_between {
            return false;
        }
    }
    true
}

/// Rotate items so no word repeats inside the spacing window.
///
/// A conflicting item is swapped with the nearest later item that fits.
/// Follow-ups that still violate spacing afterwards are dropped.
pub fn enforce_spacing(items: &mut Vec<ExerciseItem>) {
    for i in 0..items.len() {
        if !conflicts_at(items, &items[i], i) {
            continue;
        }
        if let Some(j) = (i + 1..items.len()).find(|&j| can_swap(items, i, j)) {
            items.swap(i, j);
        }
    }

    while let Some(at) = first_violation(items) {
        items.remove(at);
    }
}

fn first_violation(items: &[ExerciseItem]) -> Option<usize> {
    (0..items.len())
        .find(|&i| items[i].origin == ItemOrigin::FollowUp && conflicts_at(items, &items[i], i))
}

/// True when no word repeats inside any window of `SPACING_WINDOW` items.
pub fn is_well_spaced(items: &[ExerciseItem]) -> bool {
    (0..items.len()).all(|i| !conflicts_at(items, &items[i], i))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(id: i64) -> ExerciseItem {
        ExerciseItem::new(id, 3, ItemOrigin::Overdue)
    }

    fn intro(id: i64) -> ExerciseItem {
        ExerciseItem::new(id, 1, ItemOrigin::New)
    }

    fn followup(id: i64) -> ExerciseItem {
        ExerciseItem::new(id, 2, ItemOrigin::FollowUp)
    }

    fn ids(items: &[ExerciseItem]) -> Vec<i64> {
        items.iter().map(|i| i.word_id).collect()
    }

    #[test]
    fn test_middle_interleaves_three_reviews_then_one_new() {
        let out = interleave(
            (1..=7).map(review).collect(),
            vec![intro(100), intro(101)],
            NewWordsPosition::Middle,
            3,
        );
        assert_eq!(ids(&out), vec![1, 2, 3, 100, 4, 5, 6, 101, 7]);
    }

    #[test]
    fn test_middle_appends_leftover_new_words() {
        let out = interleave(vec![review(1)], vec![intro(100), intro(101)], NewWordsPosition::Middle, 2);
        assert_eq!(ids(&out), vec![1, 100, 101]);
    }

    #[test]
    fn test_middle_with_no_reviews() {
        let out = interleave(Vec::new(), vec![intro(100), intro(101)], NewWordsPosition::Middle, 3);
        assert_eq!(ids(&out), vec![100, 101]);
    }

    #[test]
    fn test_start_and_end() {
        let start = interleave(vec![review(1)], vec![intro(9)], NewWordsPosition::Start, 3);
        assert_eq!(ids(&start), vec![9, 1]);
        let end = interleave(vec![review(1)], vec![intro(9)], NewWordsPosition::End, 3);
        assert_eq!(ids(&end), vec![1, 9]);
    }

    #[test]
    fn test_followup_lands_after_gap() {
        let mut items = vec![intro(9), review(1), review(2), review(3), review(4)];
        place_followups(&mut items, vec![followup(9)]);
        assert_eq!(ids(&items), vec![9, 1, 2, 3, 9, 4]);
        assert!(is_well_spaced(&items));
    }

    #[test]
    fn test_unspaceable_followup_is_dropped() {
        let mut items = vec![review(1), intro(9)];
        place_followups(&mut items, vec![followup(9)]);
        enforce_spacing(&mut items);
        assert_eq!(ids(&items), vec![1, 9]);
    }

    #[test]
    fn test_conflict_is_rotated_forward() {
        let mut items = vec![intro(9), review(1), followup(9), review(2), review(3)];
        enforce_spacing(&mut items);
        assert!(is_well_spaced(&items));
        assert_eq!(items.len(), 5);
        let intro_at = items.iter().position(|i| i.origin == ItemOrigin::New).unwrap();
        let follow_at = items.iter().position(|i| i.origin == ItemOrigin::FollowUp).unwrap();
        assert!(follow_at >= intro_at + SPACING_WINDOW);
    }

    #[test]
    fn test_parse_position() {
        assert_eq!("MIDDLE".parse::<NewWordsPosition>(), Ok(NewWordsPosition::Middle));
        assert!("sideways".parse::<NewWordsPosition>().is_err());
    }
}
