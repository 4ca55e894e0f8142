pub mod change_queue;
