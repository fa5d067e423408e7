//! Built-in Playfair cipher backend.
//!
//! The task material lives in `tasks.params`: the cipher text, the 5x5
//! solution grid and the expected answer (two numbers and a postal address,
//! newline separated). Teams buy grid cells out of a decreasing score
//! budget; grading gives partial credit for a near-miss address.

use once_cell::sync::Lazy;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::{Value, json};

use super::{
    BackendError, GeneratedTask, Grading, HintOutcome, TaskBackend,
};
use crate::model::tasks::Task;

/// Playfair merges W into V, leaving 25 letters for the 5x5 grid.
const ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVXYZ";
const GRID_SIZE: usize = 5;

const INITIAL_SCORE: i64 = 500;
const HINT_COST: i64 = 10;
const DEFAULT_REVEALED_CELLS: usize = 5;

/// Submissions above this score count as solutions.
const SOLUTION_THRESHOLD: Decimal = Decimal::ONE;

pub struct PlayfairBackend;

impl TaskBackend for PlayfairBackend {
    fn generate(
        &self,
        task: &Task,
        seed: u64,
    ) -> Result<GeneratedTask, BackendError> {
        let params: Value = serde_json::from_str(&task.params)
            .map_err(|e| BackendError::Protocol(format!("bad params: {e}")))?;
        let cipher_text = param_str(&params, "cipher_text")?;
        let firstname = param_str(&params, "firstname")?;
        let answer = param_str(&params, "answer")?;
        let grid = parse_grid(param_str(&params, "grid")?)?;

        let initial_score = params
            .get("initial_score")
            .and_then(Value::as_i64)
            .unwrap_or(INITIAL_SCORE);
        let revealed = params
            .get("revealed_cells")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_REVEALED_CELLS);

        // The revealed cells are drawn from the attempt seed, so re-fetching
        // the same attempt's task always yields the same instance.
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut cells: Vec<usize> = (0..GRID_SIZE * GRID_SIZE).collect();
        cells.shuffle(&mut rng);
        let initial_hints = initial_grid(&grid, &cells[..revealed.min(cells.len())]);

        let team_data = json!({
            "cipher_text": cipher_text,
            "firstname": firstname,
            "hints": initial_hints,
            "score": initial_score,
        });
        let full_data = json!({
            "cipher_text": cipher_text,
            "firstname": firstname,
            "answer": answer,
            "hints": grid,
            "initial_hints": initial_hints,
            "initial_score": initial_score,
        });
        Ok(GeneratedTask {
            team_data,
            full_data,
        })
    }

    fn grant_hint(
        &self,
        _task: &Task,
        full_data: &Value,
        team_data: &Value,
        query: &Value,
    ) -> Result<HintOutcome, BackendError> {
        let refused = || HintOutcome {
            success: false,
            team_data: team_data.clone(),
            full_data: full_data.clone(),
        };

        let score = team_data
            .get("score")
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                BackendError::Protocol("team data has no score".into())
            })?;
        if score < HINT_COST {
            return Ok(refused());
        }

        let full_hints = full_data.get("hints").ok_or_else(|| {
            BackendError::Protocol("full data has no hints".into())
        })?;
        let Some(cell) = locate_requested_cell(full_hints, team_data, query)
        else {
            return Ok(refused());
        };

        let mut updated = team_data.clone();
        let revealed = full_hints
            .get(cell.0)
            .and_then(|row| row.get(cell.1))
            .cloned()
            .ok_or_else(|| {
                BackendError::Protocol("full hints grid is ragged".into())
            })?;
        updated["hints"][cell.0][cell.1] = revealed;
        updated["score"] = json!(score - HINT_COST);
        Ok(HintOutcome {
            success: true,
            team_data: updated,
            full_data: full_data.clone(),
        })
    }

    fn grade(
        &self,
        _task: &Task,
        full_data: &Value,
        team_data: &Value,
        answer: &Value,
    ) -> Result<Option<Grading>, BackendError> {
        let expected = full_data
            .get("answer")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                BackendError::Protocol("full data has no answer".into())
            })?;
        let mut lines = expected.lines();
        let (Some(ex_n1), Some(ex_n2), Some(ex_addr)) =
            (lines.next(), lines.next(), lines.next())
        else {
            return Err(BackendError::Protocol(
                "expected answer must have three lines".into(),
            ));
        };

        let field = |key: &str| {
            canon_input(answer.get(key).and_then(Value::as_str).unwrap_or(""))
        };
        let in_n1 = field("n1");
        let in_n2 = field("n2");
        let in_addr = field("a");

        let total_len = in_n1.len() + in_n2.len() + in_addr.len();
        if total_len == 0 || total_len > 100 {
            return Ok(None);
        }

        let n1_correct = in_n1 == canon_input(ex_n1);
        let n2_correct = in_n2 == canon_input(ex_n2);
        let address_factor = address_credit(&in_addr, &canon_input(ex_addr));

        let quarter = Decimal::new(25, 2);
        let half = Decimal::new(5, 1);
        let factor = quarter * Decimal::from(n1_correct as i64)
            + quarter * Decimal::from(n2_correct as i64)
            + half * address_factor;

        // The budget left after hint purchases caps the achievable score.
        let base = team_data
            .get("score")
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                BackendError::Protocol("team data has no score".into())
            })?;
        let score = (Decimal::from(base) * factor).normalize();

        Ok(Some(Grading {
            feedback: json!({
                "n1_correct": n1_correct,
                "n2_correct": n2_correct,
                "address_factor": address_factor.to_string(),
                "score": score.to_string(),
            }),
            score,
            is_solution: score >= SOLUTION_THRESHOLD,
            is_full_solution: factor == Decimal::ONE,
        }))
    }

    fn reset_hints(
        &self,
        _task: &Task,
        full_data: &Value,
    ) -> Result<Value, BackendError> {
        let get = |key: &str| {
            full_data.get(key).cloned().ok_or_else(|| {
                BackendError::Protocol(format!("full data has no {key}"))
            })
        };
        Ok(json!({
            "cipher_text": get("cipher_text")?,
            "firstname": get("firstname")?,
            "hints": get("initial_hints")?,
            "score": get("initial_score")?,
        }))
    }
}

fn param_str<'a>(
    params: &'a Value,
    key: &str,
) -> Result<&'a str, BackendError> {
    params.get(key).and_then(Value::as_str).ok_or_else(|| {
        BackendError::Protocol(format!("params missing {key}"))
    })
}

/// Parse 25 whitespace-separated letters into a 5x5 grid of hint cells.
fn parse_grid(text: &str) -> Result<Value, BackendError> {
    let cells: Vec<Value> = text
        .split_whitespace()
        .map(|token| {
            let rank = token
                .chars()
                .next()
                .map(|c| match c.to_ascii_uppercase() {
                    'W' => 'V',
                    c => c,
                })
                .and_then(|c| ALPHABET.find(c));
            match rank {
                Some(rank) => json!({ "q": "hint", "l": rank }),
                None => json!({ "q": "unknown" }),
            }
        })
        .collect();
    if cells.len() != GRID_SIZE * GRID_SIZE {
        return Err(BackendError::Protocol(format!(
            "grid must have {} cells, got {}",
            GRID_SIZE * GRID_SIZE,
            cells.len()
        )));
    }
    let rows: Vec<Value> = cells
        .chunks(GRID_SIZE)
        .map(|row| Value::Array(row.to_vec()))
        .collect();
    Ok(Value::Array(rows))
}

/// All-unknown grid with the given flat cell indices revealed from `grid`.
fn initial_grid(grid: &Value, revealed: &[usize]) -> Value {
    let rows: Vec<Value> = (0..GRID_SIZE)
        .map(|row| {
            let cells: Vec<Value> = (0..GRID_SIZE)
                .map(|col| {
                    if revealed.contains(&(row * GRID_SIZE + col)) {
                        grid[row][col].clone()
                    } else {
                        json!({ "q": "unknown" })
                    }
                })
                .collect();
            Value::Array(cells)
        })
        .collect();
    Value::Array(rows)
}

/// Resolve a hint query to the (row, col) it would reveal, or None when the
/// query is malformed, out of range, or the cell is already revealed.
fn locate_requested_cell(
    full_hints: &Value,
    team_data: &Value,
    query: &Value,
) -> Option<(usize, usize)> {
    let team_hints = team_data.get("hints")?;
    let cell_known = |row: usize, col: usize| {
        team_hints
            .get(row)
            .and_then(|r| r.get(col))
            .and_then(|c| c.get("l"))
            .is_some()
    };
    match query.get("type")?.as_str()? {
        "grid" => {
            let row = query.get("row")?.as_u64()? as usize;
            let col = query.get("col")?.as_u64()? as usize;
            if row >= GRID_SIZE || col >= GRID_SIZE || cell_known(row, col) {
                return None;
            }
            Some((row, col))
        }
        "alphabet" => {
            let rank = query.get("rank")?.as_u64()?;
            for row in 0..GRID_SIZE {
                for col in 0..GRID_SIZE {
                    let matches = full_hints
                        .get(row)
                        .and_then(|r| r.get(col))
                        .and_then(|c| c.get("l"))
                        .and_then(Value::as_u64)
                        == Some(rank);
                    if matches && !cell_known(row, col) {
                        return Some((row, col));
                    }
                }
            }
            None
        }
        _ => None,
    }
}

/// Fold to ASCII uppercase and strip everything but letters and digits, so
/// accents, spacing and punctuation do not affect grading. The W/V merge is
/// a property of the cipher grid only; answer fields keep both letters, so
/// a misspelled address stays distinguishable from the expected one.
fn canon_input(input: &str) -> String {
    static NON_ALNUM: Lazy<Regex> =
        Lazy::new(|| Regex::new("[^0-9A-Z]+").unwrap());
    let folded: String = input
        .chars()
        .map(fold_ascii)
        .collect::<String>()
        .to_uppercase();
    NON_ALNUM.replace_all(&folded, "").into_owned()
}

fn fold_ascii(c: char) -> char {
    match c {
        'à' | 'â' | 'ä' | 'À' | 'Â' | 'Ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => 'e',
        'î' | 'ï' | 'Î' | 'Ï' => 'i',
        'ô' | 'ö' | 'Ô' | 'Ö' => 'o',
        'ù' | 'û' | 'ü' | 'Ù' | 'Û' | 'Ü' => 'u',
        'ç' | 'Ç' => 'c',
        _ => c,
    }
}

/// Full credit for an exact address, half credit within two edits, so a
/// one-letter misspelling still earns partial address credit.
fn address_credit(submitted: &str, expected: &str) -> Decimal {
    if submitted == expected {
        Decimal::ONE
    } else if levenshtein(submitted, expected) <= 2 {
        Decimal::new(5, 1)
    } else {
        Decimal::ZERO
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let sub = prev[j] + usize::from(ca != cb);
            cur[j + 1] = sub.min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with_params(params: Value) -> Task {
        Task {
            id: "task-1".into(),
            title: "Playfair".into(),
            backend: "playfair".into(),
            backend_url: None,
            backend_auth: None,
            frontend_url: None,
            params: params.to_string(),
        }
    }

    fn sample_task() -> Task {
        task_with_params(json!({
            "cipher_text": "KVTRE ZQLMB",
            "firstname": "Marguerite",
            "answer": "14\n449\n134 avenue de Wagram",
            "grid": "B I D G K\n N X R Q U\n A L E O Z\n F C H M P\n T S V Y J"
                .replace('J', "A"),
        }))
    }

    fn generated() -> (Task, GeneratedTask) {
        let task = sample_task();
        let generated = PlayfairBackend.generate(&task, 42).unwrap();
        (task, generated)
    }

    #[test]
    fn generation_is_deterministic_in_the_seed() {
        let task = sample_task();
        let a = PlayfairBackend.generate(&task, 7).unwrap();
        let b = PlayfairBackend.generate(&task, 7).unwrap();
        let c = PlayfairBackend.generate(&task, 8).unwrap();
        assert_eq!(a.team_data, b.team_data);
        assert_ne!(a.team_data["hints"], c.team_data["hints"]);
    }

    #[test]
    fn team_data_does_not_carry_the_answer() {
        let (_, generated) = generated();
        assert!(generated.team_data.get("answer").is_none());
        assert_eq!(generated.team_data["score"], json!(INITIAL_SCORE));
    }

    #[test]
    fn grid_hint_reveals_a_cell_and_costs_ten() {
        let (task, generated) = generated();
        // Find a cell still unknown in the team grid.
        let hints = &generated.team_data["hints"];
        let (row, col) = (0..GRID_SIZE)
            .flat_map(|r| (0..GRID_SIZE).map(move |c| (r, c)))
            .find(|(r, c)| hints[*r][*c].get("l").is_none())
            .unwrap();
        let outcome = PlayfairBackend
            .grant_hint(
                &task,
                &generated.full_data,
                &generated.team_data,
                &json!({ "type": "grid", "row": row, "col": col }),
            )
            .unwrap();
        assert!(outcome.success);
        assert_eq!(
            outcome.team_data["score"],
            json!(INITIAL_SCORE - HINT_COST)
        );
        assert!(outcome.team_data["hints"][row][col].get("l").is_some());
        // The original team data was not touched.
        assert_eq!(generated.team_data["score"], json!(INITIAL_SCORE));
    }

    #[test]
    fn hint_on_revealed_cell_is_refused() {
        let (task, generated) = generated();
        let hints = &generated.team_data["hints"];
        let (row, col) = (0..GRID_SIZE)
            .flat_map(|r| (0..GRID_SIZE).map(move |c| (r, c)))
            .find(|(r, c)| hints[*r][*c].get("l").is_some())
            .unwrap();
        let outcome = PlayfairBackend
            .grant_hint(
                &task,
                &generated.full_data,
                &generated.team_data,
                &json!({ "type": "grid", "row": row, "col": col }),
            )
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.team_data, generated.team_data);
    }

    #[test]
    fn exact_answer_is_a_full_solution() {
        let (task, generated) = generated();
        let grading = PlayfairBackend
            .grade(
                &task,
                &generated.full_data,
                &generated.team_data,
                &json!({ "n1": "14", "n2": "449", "a": "134 avenue de Wagram" }),
            )
            .unwrap()
            .unwrap();
        assert!(grading.is_solution);
        assert!(grading.is_full_solution);
        assert_eq!(grading.score, Decimal::from(INITIAL_SCORE));
    }

    #[test]
    fn near_miss_address_earns_partial_credit() {
        let (task, generated) = generated();
        let grading = PlayfairBackend
            .grade(
                &task,
                &generated.full_data,
                &generated.team_data,
                &json!({ "n1": "14", "n2": "449", "a": "134 avenue de Vagram" }),
            )
            .unwrap()
            .unwrap();
        assert!(grading.is_solution);
        assert!(!grading.is_full_solution);
        assert!(grading.score < Decimal::from(INITIAL_SCORE));
        assert!(grading.score >= SOLUTION_THRESHOLD);
        // Both numbers exact, half of the address factor: 500 * 0.75.
        assert_eq!(grading.score.to_string(), "375");
        assert_eq!(grading.feedback["address_factor"], json!("0.5"));
    }

    #[test]
    fn empty_submission_is_not_gradable() {
        let (task, generated) = generated();
        let grading = PlayfairBackend
            .grade(
                &task,
                &generated.full_data,
                &generated.team_data,
                &json!({ "n1": "", "n2": "", "a": "" }),
            )
            .unwrap();
        assert!(grading.is_none());
    }

    #[test]
    fn reset_restores_the_pristine_team_data() {
        let (task, generated) = generated();
        let outcome = PlayfairBackend
            .grant_hint(
                &task,
                &generated.full_data,
                &generated.team_data,
                &json!({ "type": "alphabet", "rank": 3 }),
            )
            .unwrap();
        let reset = PlayfairBackend
            .reset_hints(&task, &outcome.full_data)
            .unwrap();
        assert_eq!(reset, generated.team_data);
    }

    #[test]
    fn canonicalization_ignores_accents_case_and_punctuation() {
        assert_eq!(
            canon_input("134, Avenue de Wagram"),
            canon_input("134 avenue de WAGRAM")
        );
        assert_eq!(canon_input("Électre"), "ELECTRE");
        // The grid merges W into V; submitted answers keep the distinction.
        assert_ne!(canon_input("Wagram"), canon_input("Vagram"));
    }

    #[test]
    fn levenshtein_counts_edits() {
        assert_eq!(levenshtein("WAGRAM", "VAGRAM"), 1);
        assert_eq!(levenshtein("WAGRAM", "WAGRAM"), 0);
        assert_eq!(levenshtein("", "ABC"), 3);
    }
}
