pub mod withdrawal_recorder;
