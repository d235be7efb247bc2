pub mod tat_sync;
