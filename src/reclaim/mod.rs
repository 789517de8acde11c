pub mod reclaimer;
