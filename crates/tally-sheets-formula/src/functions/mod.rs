//! Built-in function library
//!
//! The function set is closed: every function is registered here and
//! dispatched through a single lookup. `IF` and `SUBTOTAL` are special
//! forms handled directly by the evaluator (they need unevaluated
//! arguments) and do not appear in the registry.

pub mod criteria;
pub mod date;
pub mod logical;
pub mod math;

use crate::error::FormulaResult;
use crate::evaluator::{EvaluationContext, FormulaValue};
use ahash::AHashMap;
use once_cell::sync::Lazy;

/// Function implementation signature
pub type FunctionImpl = fn(&[FormulaValue], &EvaluationContext) -> FormulaResult<FormulaValue>;

/// Function definition
pub struct FunctionDef {
    /// Function name (uppercase)
    pub name: &'static str,
    /// Minimum arguments
    pub min_args: usize,
    /// Maximum arguments (None = unlimited)
    pub max_args: Option<usize>,
    /// Implementation
    pub implementation: FunctionImpl,
}

/// Function registry
pub struct FunctionRegistry {
    functions: AHashMap<&'static str, FunctionDef>,
}

impl FunctionRegistry {
    fn new() -> Self {
        let mut registry = Self {
            functions: AHashMap::new(),
        };
        registry.register_math();
        registry.register_logical();
        registry.register_date();
        registry
    }

    /// Look up a function by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name.to_uppercase().as_str())
    }

    fn register(&mut self, def: FunctionDef) {
        self.functions.insert(def.name, def);
    }

    fn register_math(&mut self) {
        self.register(FunctionDef {
            name: "SUM",
            min_args: 1,
            max_args: None,
            implementation: math::fn_sum,
        });
        self.register(FunctionDef {
            name: "PRODUCT",
            min_args: 1,
            max_args: None,
            implementation: math::fn_product,
        });
        self.register(FunctionDef {
            name: "AVERAGE",
            min_args: 1,
            max_args: None,
            implementation: math::fn_average,
        });
        self.register(FunctionDef {
            name: "MIN",
            min_args: 1,
            max_args: None,
            implementation: math::fn_min,
        });
        self.register(FunctionDef {
            name: "MAX",
            min_args: 1,
            max_args: None,
            implementation: math::fn_max,
        });
        self.register(FunctionDef {
            name: "COUNT",
            min_args: 1,
            max_args: None,
            implementation: math::fn_count,
        });
        self.register(FunctionDef {
            name: "COUNTA",
            min_args: 1,
            max_args: None,
            implementation: math::fn_counta,
        });
        self.register(FunctionDef {
            name: "COUNTIF",
            min_args: 2,
            max_args: Some(2),
            implementation: math::fn_countif,
        });
        self.register(FunctionDef {
            name: "SUMIF",
            min_args: 2,
            max_args: Some(3),
            implementation: math::fn_sumif,
        });
    }

    fn register_logical(&mut self) {
        self.register(FunctionDef {
            name: "AND",
            min_args: 1,
            max_args: None,
            implementation: logical::fn_and,
        });
        self.register(FunctionDef {
            name: "OR",
            min_args: 1,
            max_args: None,
            implementation: logical::fn_or,
        });
        self.register(FunctionDef {
            name: "NOT",
            min_args: 1,
            max_args: Some(1),
            implementation: logical::fn_not,
        });
        self.register(FunctionDef {
            name: "TRUE",
            min_args: 0,
            max_args: Some(0),
            implementation: logical::fn_true,
        });
        self.register(FunctionDef {
            name: "FALSE",
            min_args: 0,
            max_args: Some(0),
            implementation: logical::fn_false,
        });
    }

    fn register_date(&mut self) {
        self.register(FunctionDef {
            name: "DATE",
            min_args: 3,
            max_args: Some(3),
            implementation: date::fn_date,
        });
        self.register(FunctionDef {
            name: "YEAR",
            min_args: 1,
            max_args: Some(1),
            implementation: date::fn_year,
        });
        self.register(FunctionDef {
            name: "MONTH",
            min_args: 1,
            max_args: Some(1),
            implementation: date::fn_month,
        });
        self.register(FunctionDef {
            name: "DAY",
            min_args: 1,
            max_args: Some(1),
            implementation: date::fn_day,
        });
    }
}

static REGISTRY: Lazy<FunctionRegistry> = Lazy::new(FunctionRegistry::new);

/// The global function registry
pub fn registry() -> &'static FunctionRegistry {
    &REGISTRY
}
