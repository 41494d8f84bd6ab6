pub mod run_status;
pub mod run_trigger;
pub mod script;
pub mod script_run;
