use thiserror::Error;

/// Reserved id matching every installed tribe in `Is`/`Count` clauses.
pub const ANY_TRIBE_ID: &str = "any";

/// Reserved id of the background tribe every ruleset must contain.
pub const DEAD_TRIBE_ID: &str = "dead";

/// Upper bound on tribes per ruleset, fixed by the `TribeSet` bitmask width.
pub const MAX_TRIBES: usize = 64;

/// A named, colored population identity a cell can hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tribe {
    pub id: String,
    /// RGB color used by the renderer.
    pub color: [u8; 3],
}

impl Tribe {
    pub fn new(id: &str, color: [u8; 3]) -> Self {
        Self {
            id: id.to_string(),
            color,
        }
    }

    /// The reserved background tribe. Always black.
    pub fn dead() -> Self {
        Self::new(DEAD_TRIBE_ID, [0, 0, 0])
    }
}

/// A boolean predicate over a cell's own tribe and its neighbor counts.
///
/// Tribe references are ids, resolved to indices when the ruleset is
/// installed (see `interp`). `ANY_TRIBE_ID` is accepted anywhere an id is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    /// True if the cell's own tribe is in the set.
    Is { tribes: Vec<String> },
    /// True if the Moore-neighbor count over the set falls in the inclusive
    /// interval. Bounds outside 0..=8 are legal and never satisfied.
    Count {
        tribes: Vec<String>,
        interval: (u8, u8),
    },
    /// Static identity comparison of the two references themselves.
    Equality { tribe1: String, tribe2: String },
    Not { clause: Box<Clause> },
    And { clauses: Vec<Clause> },
    Or { clauses: Vec<Clause> },
}

impl Clause {
    pub fn is(tribes: &[&str]) -> Self {
        Self::Is {
            tribes: tribes.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn count(tribes: &[&str], lo: u8, hi: u8) -> Self {
        Self::Count {
            tribes: tribes.iter().map(|t| t.to_string()).collect(),
            interval: (lo, hi),
        }
    }

    pub fn equality(tribe1: &str, tribe2: &str) -> Self {
        Self::Equality {
            tribe1: tribe1.to_string(),
            tribe2: tribe2.to_string(),
        }
    }

    pub fn not(clause: Clause) -> Self {
        Self::Not {
            clause: Box::new(clause),
        }
    }

    pub fn and(clauses: Vec<Clause>) -> Self {
        Self::And { clauses }
    }

    pub fn or(clauses: Vec<Clause>) -> Self {
        Self::Or { clauses }
    }
}

/// The tribe a cell becomes if `clause` holds for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub clause: Clause,
    pub tribe: String,
}

impl Rule {
    pub fn new(clause: Clause, tribe: &str) -> Self {
        Self {
            clause,
            tribe: tribe.to_string(),
        }
    }
}

/// Grid dimensions + tribe catalogue + ordered transition rules.
///
/// Rules are tried in order for every cell each generation; the first match
/// wins and a cell matching none becomes the dead tribe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ruleset {
    pub cols: u32,
    pub rows: u32,
    pub tribes: Vec<Tribe>,
    pub rules: Vec<Rule>,
}

impl Ruleset {
    /// Classic Conway B3/S23 expressed as a clause tree over one live tribe.
    pub fn conway() -> Self {
        Self {
            cols: 256,
            rows: 160,
            tribes: vec![Tribe::dead(), Tribe::new("classic", [0x3c, 0xff, 0x6e])],
            rules: vec![
                Rule::new(
                    Clause::and(vec![
                        Clause::is(&["classic"]),
                        Clause::count(&["classic"], 2, 3),
                    ]),
                    "classic",
                ),
                Rule::new(
                    Clause::and(vec![
                        Clause::is(&["dead"]),
                        Clause::count(&["classic"], 3, 3),
                    ]),
                    "classic",
                ),
            ],
        }
    }

    /// Two-color Conway: births take the majority color among the three
    /// parents, relying on rule order for the tie-free fallthrough.
    pub fn immigration() -> Self {
        let live = &["orange", "blue"][..];
        Self {
            cols: 192,
            rows: 120,
            tribes: vec![
                Tribe::dead(),
                Tribe::new("orange", [0xff, 0x9e, 0x2c]),
                Tribe::new("blue", [0x2c, 0x9e, 0xff]),
            ],
            rules: vec![
                Rule::new(
                    Clause::and(vec![Clause::is(&["orange"]), Clause::count(live, 2, 3)]),
                    "orange",
                ),
                Rule::new(
                    Clause::and(vec![Clause::is(&["blue"]), Clause::count(live, 2, 3)]),
                    "blue",
                ),
                Rule::new(
                    Clause::and(vec![
                        Clause::is(&["dead"]),
                        Clause::count(live, 3, 3),
                        Clause::count(&["orange"], 2, 3),
                    ]),
                    "orange",
                ),
                Rule::new(
                    Clause::and(vec![Clause::is(&["dead"]), Clause::count(live, 3, 3)]),
                    "blue",
                ),
            ],
        }
    }

    /// Seeds B2/S: every live cell dies, births on exactly two neighbors.
    pub fn seeds() -> Self {
        Self {
            cols: 256,
            rows: 160,
            tribes: vec![Tribe::dead(), Tribe::new("spark", [0xff, 0xe8, 0x4d])],
            rules: vec![Rule::new(
                Clause::and(vec![Clause::is(&["dead"]), Clause::count(&["spark"], 2, 2)]),
                "spark",
            )],
        }
    }

    /// Rock-paper-scissors predation: a cell is converted by three or more
    /// neighbors of its predator tribe, otherwise holds its ground; dead
    /// cells are colonized by exactly three neighbors of one tribe.
    pub fn predation() -> Self {
        let mut rules = Vec::new();
        // (prey, predator) cycle
        for &(prey, pred) in &[("red", "green"), ("green", "blue"), ("blue", "red")] {
            rules.push(Rule::new(
                Clause::and(vec![Clause::is(&[prey]), Clause::count(&[pred], 3, 8)]),
                pred,
            ));
        }
        for tribe in ["red", "green", "blue"] {
            rules.push(Rule::new(
                Clause::and(vec![Clause::is(&["dead"]), Clause::count(&[tribe], 3, 3)]),
                tribe,
            ));
        }
        for tribe in ["red", "green", "blue"] {
            rules.push(Rule::new(Clause::is(&[tribe]), tribe));
        }
        Self {
            cols: 160,
            rows: 100,
            tribes: vec![
                Tribe::dead(),
                Tribe::new("red", [0xe8, 0x3a, 0x3a]),
                Tribe::new("green", [0x3a, 0xe8, 0x5c]),
                Tribe::new("blue", [0x3a, 0x6e, 0xe8]),
            ],
            rules,
        }
    }
}

/// Set of tribe indices as a bitmask. Index = position in `Ruleset::tribes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TribeSet(u64);

impl TribeSet {
    pub const EMPTY: TribeSet = TribeSet(0);

    /// Set containing the first `n` tribe indices (the `any` wildcard).
    pub fn full(n: usize) -> Self {
        debug_assert!(n <= MAX_TRIBES);
        if n >= MAX_TRIBES {
            TribeSet(u64::MAX)
        } else {
            TribeSet((1u64 << n) - 1)
        }
    }

    pub fn insert(&mut self, index: u8) {
        self.0 |= 1u64 << index;
    }

    pub fn contains(self, index: u8) -> bool {
        self.0 & (1u64 << index) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Reasons a ruleset is rejected at install time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RulesetError {
    #[error("grid dimensions must be positive, got {cols}x{rows}")]
    EmptyGrid { cols: u32, rows: u32 },
    #[error("ruleset must contain the '{DEAD_TRIBE_ID}' tribe")]
    MissingDeadTribe,
    #[error("duplicate tribe id '{0}'")]
    DuplicateTribe(String),
    #[error("ruleset has {0} tribes, the maximum is {MAX_TRIBES}")]
    TooManyTribes(usize),
    #[error("unknown tribe id '{0}' referenced by a rule")]
    UnknownTribe(String),
    #[error("'{ANY_TRIBE_ID}' is not a tribe a cell can become")]
    AnyAsTarget,
    #[error("'is'/'count' clauses need at least one tribe")]
    EmptyTribeList,
    #[error("'and'/'or' clauses need at least one operand")]
    EmptyClauseList,
}
