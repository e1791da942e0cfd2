use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Shown in place of a question when every operator is switched off.
pub const NO_OPERATIONS_TEXT: &str = "No operations selected.";

const WHOLE_NUMBER_MAX: u32 = 99;

/// Upper bound on dividend/divisor redraws before falling back to `n / n`.
pub const MAX_DIVISION_DRAWS: u32 = 1_000;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    pub const ALL: [Operator; 4] = [Operator::Add, Operator::Sub, Operator::Mul, Operator::Div];

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
        }
    }

    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            Operator::Add => a + b,
            Operator::Sub => a - b,
            Operator::Mul => a * b,
            Operator::Div => a / b,
        }
    }
}

/// Knobs for the question generator. Values are taken as-is: the UI suggests
/// digits in 1..=5 and decimals in 0..=3 but nothing is clamped here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub addition_max_digits: u32,
    pub addition_max_decimals: u32,
    pub subtraction_max_digits: u32,
    pub subtraction_max_decimals: u32,
    pub enabled_operators: BTreeSet<Operator>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            addition_max_digits: 2,
            addition_max_decimals: 2,
            subtraction_max_digits: 2,
            subtraction_max_decimals: 2,
            enabled_operators: Operator::ALL.into_iter().collect(),
        }
    }
}

impl GenerationConfig {
    pub fn only(operators: &[Operator]) -> Self {
        Self {
            enabled_operators: operators.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn set_operator(&mut self, op: Operator, enabled: bool) {
        if enabled {
            self.enabled_operators.insert(op);
        } else {
            self.enabled_operators.remove(&op);
        }
    }
}

/// A single prompt shown to the user.
///
/// Message questions (no operators selected, time up) carry no operator and
/// no expected answer, so nothing typed can ever match them.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    operand_a: f64,
    operand_b: f64,
    operator: Option<Operator>,
    display_text: String,
    expected_answer: Option<f64>,
}

impl Question {
    pub fn new(operator: Operator, operand_a: f64, operand_b: f64) -> Self {
        Self {
            operand_a,
            operand_b,
            operator: Some(operator),
            display_text: format!("{} {} {} = ?", operand_a, operator.symbol(), operand_b),
            expected_answer: Some(operator.apply(operand_a, operand_b)),
        }
    }

    pub fn message(text: impl Into<String>) -> Self {
        Self {
            operand_a: 0.0,
            operand_b: 0.0,
            operator: None,
            display_text: text.into(),
            expected_answer: None,
        }
    }

    pub fn no_operations() -> Self {
        Self::message(NO_OPERATIONS_TEXT)
    }

    pub fn operand_a(&self) -> f64 {
        self.operand_a
    }

    pub fn operand_b(&self) -> f64 {
        self.operand_b
    }

    pub fn operator(&self) -> Option<Operator> {
        self.operator
    }

    pub fn display_text(&self) -> &str {
        &self.display_text
    }

    pub fn expected_answer(&self) -> Option<f64> {
        self.expected_answer
    }

    pub fn is_answerable(&self) -> bool {
        self.expected_answer.is_some()
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_text)
    }
}

/// Source of randomness for question generation.
///
/// Every `rand::Rng` is a `RandomSource`, so a seeded `StdRng` gives
/// reproducible questions.
pub trait RandomSource {
    /// Uniform integer in `low..=high`.
    fn int_inclusive(&mut self, low: u32, high: u32) -> u32;
    /// Uniform real in `[0, 1)`.
    fn unit(&mut self) -> f64;
}

impl<R: Rng + ?Sized> RandomSource for R {
    fn int_inclusive(&mut self, low: u32, high: u32) -> u32 {
        self.gen_range(low..=high)
    }

    fn unit(&mut self) -> f64 {
        self.gen::<f64>()
    }
}

pub fn generate<R: RandomSource + ?Sized>(config: &GenerationConfig, rng: &mut R) -> Question {
    let candidates: Vec<Operator> = config.enabled_operators.iter().copied().collect();
    if candidates.is_empty() {
        return Question::no_operations();
    }

    let pick = rng.int_inclusive(0, candidates.len() as u32 - 1) as usize;
    let operator = candidates[pick.min(candidates.len() - 1)];

    let (a, b) = match operator {
        Operator::Add => {
            let bound = digit_bound(config.addition_max_digits);
            let a = bounded_random_decimal(rng, bound, config.addition_max_decimals);
            let b = bounded_random_decimal(rng, bound, config.addition_max_decimals);
            (a, b)
        }
        Operator::Sub => {
            let bound = digit_bound(config.subtraction_max_digits);
            let x = bounded_random_decimal(rng, bound, config.subtraction_max_decimals);
            let y = bounded_random_decimal(rng, bound, config.subtraction_max_decimals);
            if y > x {
                (y, x)
            } else {
                (x, y)
            }
        }
        Operator::Mul => (
            rng.int_inclusive(0, WHOLE_NUMBER_MAX) as f64,
            rng.int_inclusive(0, WHOLE_NUMBER_MAX) as f64,
        ),
        Operator::Div => {
            let (dividend, divisor) = exact_division_pair(rng);
            (dividend as f64, divisor as f64)
        }
    };

    Question::new(operator, a, b)
}

/// Largest value with `digits` integer digits, e.g. 2 -> 99.
fn digit_bound(digits: u32) -> f64 {
    10f64.powi(digits as i32) - 1.0
}

/// Uniform draw in `[0, bound]` rounded to a random number of places in
/// `0..=max_decimals`.
pub fn bounded_random_decimal<R: RandomSource + ?Sized>(
    rng: &mut R,
    bound: f64,
    max_decimals: u32,
) -> f64 {
    let decimals = rng.int_inclusive(0, max_decimals);
    let factor = 10f64.powi(decimals as i32);
    let raw = rng.unit() * bound;
    (raw * factor).round() / factor
}

fn exact_division_pair<R: RandomSource + ?Sized>(rng: &mut R) -> (u32, u32) {
    for _ in 0..MAX_DIVISION_DRAWS {
        let dividend = rng.int_inclusive(1, WHOLE_NUMBER_MAX);
        let divisor = rng.int_inclusive(1, WHOLE_NUMBER_MAX);
        if dividend % divisor == 0 {
            return (dividend, divisor);
        }
    }

    let divisor = rng.int_inclusive(1, WHOLE_NUMBER_MAX);
    tracing::debug!(
        draws = MAX_DIVISION_DRAWS,
        divisor,
        "division redraw cap reached, using n / n"
    );
    (divisor, divisor)
}
