use std::io::{BufRead, Write};
use std::time::Instant;

use chrono::Utc;
use lexitrain_core::{
    Advance, CommitResult, Config, ExerciseAnswer, ExerciseItem, ExerciseKind, MemoryCatalog, RawAnswer,
    TrainingEngine, WordRef,
};

use super::{budget_seconds, open_engine, parse_mode, CliResult};

const DISTRACTOR_COUNT: usize = 3;

#[derive(Default)]
struct Tally {
    answered: u32,
    correct: u32,
    promoted: u32,
    demoted: u32,
}

pub fn run(minutes: Option<u32>, mode: &str) -> CliResult {
    let mode = parse_mode(mode)?;
    let config = Config::load()?;
    let budget = budget_seconds(&config, minutes);
    let mut engine = open_engine(config)?;

    let mut plan = engine.plan(budget, mode, Utc::now())?;
    if plan.is_empty() {
        println!("Nothing to study right now.");
        return Ok(());
    }
    println!(
        "Session: {} exercises, about {} min ({} new, {} reviews). Empty line reveals the answer.",
        plan.len(),
        plan.estimated_seconds.div_ceil(60),
        plan.new_word_count,
        plan.review_word_count
    );

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut tally = Tally::default();

    loop {
        let item = match engine.advance(&mut plan)? {
            Advance::Exercise(item) => item,
            Advance::EndOfSession => break,
        };
        let Some(word) = engine.word(item.word_id) else {
            tracing::warn!(word_id = item.word_id, "word missing from catalog, skipping");
            continue;
        };

        let Some(answer) = ask(&engine, &item, &word, &mut input)? else {
            println!("Session stopped.");
            break;
        };

        match engine.record(&mut plan, &answer, Utc::now()) {
            Ok(result) => {
                report(&result, &word);
                tally.answered += 1;
                tally.correct += u32::from(result.correct);
                if result.new_mastery_level > result.previous_mastery_level && result.previous_mastery_level > 0 {
                    tally.promoted += 1;
                } else if result.new_mastery_level < result.previous_mastery_level {
                    tally.demoted += 1;
                }
            }
            Err(e) if e.is_exercise_scoped() => println!("  ! {e}"),
            Err(e) => return Err(e.into()),
        }
    }

    println!(
        "\nDone: {} answered, {} correct, {} promoted, {} demoted.",
        tally.answered, tally.correct, tally.promoted, tally.demoted
    );
    Ok(())
}

/// Prompt for one exercise. `None` on end of input.
fn ask(
    engine: &TrainingEngine<MemoryCatalog>,
    item: &ExerciseItem,
    word: &WordRef,
    input: &mut impl BufRead,
) -> CliResult<Option<ExerciseAnswer>> {
    let kind = item.kind().unwrap_or(ExerciseKind::Introduction);
    let translation = word.first_translation().to_string();
    println!("\n[{}] ", kind.label());

    let started = Instant::now();
    let raw_answer = match kind {
        ExerciseKind::Introduction => {
            println!("  {} = {}", word.lemma, word.translations.join(", "));
            let Some(_) = read_line("  (Enter to continue) ", input)? else {
                return Ok(None);
            };
            Some(RawAnswer::Acknowledged)
        }
        kind if kind.is_multiple_choice() => match choices(engine.catalog(), word) {
            Some(options) => {
                match kind {
                    ExerciseKind::Context => println!("  Which meaning fits '{}' in context?", word.lemma),
                    _ => println!("  What does '{}' mean?", word.lemma),
                }
                pick(&options, &translation, input)?
            }
            None if !translation.is_empty() && !word.lemma.is_empty() => {
                println!("  Translate '{translation}':");
                typed(word, input)?
            }
            None => {
                println!("  What does '{}' mean? Think of the answer, then press Enter.", word.lemma);
                self_check(word, input)?
            }
        },
        kind if kind.is_typed() => {
            match kind {
                ExerciseKind::Listening => println!("  Spell the word you would hear for '{translation}':"),
                _ => println!("  Translate '{translation}':"),
            }
            typed(word, input)?
        }
        _ => {
            println!("  Use '{}' ({translation}) in a sentence of your own.", word.lemma);
            self_check(word, input)?
        }
    };
    let Some(raw_answer) = raw_answer else {
        return Ok(None);
    };

    Ok(Some(ExerciseAnswer {
        word_id: item.word_id,
        exercise_level: item.exercise_level,
        raw_answer,
        response_time_ms: started.elapsed().as_millis() as u64,
    }))
}

fn pick(options: &[String], expected: &str, input: &mut impl BufRead) -> CliResult<Option<RawAnswer>> {
    for (i, option) in options.iter().enumerate() {
        println!("    {}) {option}", i + 1);
    }
    let Some(line) = read_line("  > ", input)? else {
        return Ok(None);
    };
    let answer = match line.parse::<usize>().ok().and_then(|n| options.get(n.wrapping_sub(1))) {
        Some(chosen) => RawAnswer::Choice {
            chosen: chosen.clone(),
            expected: expected.to_string(),
        },
        None if line.is_empty() => RawAnswer::Skipped,
        None => RawAnswer::Choice {
            chosen: line,
            expected: expected.to_string(),
        },
    };
    Ok(Some(answer))
}

fn typed(word: &WordRef, input: &mut impl BufRead) -> CliResult<Option<RawAnswer>> {
    let Some(line) = read_line("  > ", input)? else {
        return Ok(None);
    };
    if line.is_empty() {
        return Ok(Some(RawAnswer::Skipped));
    }
    Ok(Some(RawAnswer::Typed {
        given: line,
        expected: word.lemma.clone(),
    }))
}

/// Free answer graded by the learner.
fn self_check(word: &WordRef, input: &mut impl BufRead) -> CliResult<Option<RawAnswer>> {
    let Some(line) = read_line("  > ", input)? else {
        return Ok(None);
    };
    if line.is_empty() {
        return Ok(Some(RawAnswer::Skipped));
    }
    if !word.translations.is_empty() {
        println!("  {} = {}", word.lemma, word.translations.join(", "));
    }
    let Some(verdict) = read_line("  Did you get it right? [y/N] ", input)? else {
        return Ok(None);
    };
    if verdict.eq_ignore_ascii_case("y") {
        Ok(Some(RawAnswer::Acknowledged))
    } else {
        Ok(Some(RawAnswer::Skipped))
    }
}

/// The correct translation plus distractors, alphabetised. `None` when
/// there are not two distinct non-empty options to choose from.
fn choices(catalog: &MemoryCatalog, word: &WordRef) -> Option<Vec<String>> {
    let correct = word.first_translation();
    if correct.is_empty() {
        return None;
    }
    let mut options: Vec<String> = catalog
        .distractors(word, DISTRACTOR_COUNT)
        .into_iter()
        .map(|w| w.first_translation().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    options.push(correct.to_string());
    options.sort();
    options.dedup();
    (options.len() >= 2).then_some(options)
}

fn read_line(prompt: &str, input: &mut impl BufRead) -> CliResult<Option<String>> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn report(result: &CommitResult, word: &WordRef) {
    let verdict = if result.correct { "correct" } else { "wrong" };
    println!("  {verdict} ({:?}), answer: {}", result.rating, word.lemma);
    if result.mastery_changed {
        println!(
            "  mastery {} -> {}",
            result.previous_mastery_level, result.new_mastery_level
        );
    }
    if result.requeued_at.is_some() {
        println!("  '{}' will come back shortly", word.lemma);
    }
    if let Some(tier) = result.tier_unlocked {
        println!("  Tier {tier} unlocked!");
    }
}
