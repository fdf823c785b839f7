pub mod orphan_sweeper;
