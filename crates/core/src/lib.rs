pub mod adjustment;
pub mod types;

pub use adjustment::{apply_raise, next_period, raise_factor, AdjustmentPolicy, AmountRange};
pub use types::{
    Division, Employee, JobTitle, NewEmployee, NewPayroll, PayrollRecord, SortOrder,
    ValidationError,
};
