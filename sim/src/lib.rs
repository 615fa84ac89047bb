// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

mod in_memory_graph;
pub use in_memory_graph::InMemoryGraph;

mod local_worker_pool;
pub use local_worker_pool::LocalWorkerPool;

mod page_rank;
pub use page_rank::PageRank;

mod label_propagation;
pub use label_propagation::LabelPropagation;
