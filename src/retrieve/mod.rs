//! External model and observation data retrieval.
//!
//! Data stores are tried in the order the caller lists them. The `disk`
//! store copies from local directories; other stores are described in a
//! data-locations file and use either the `download` protocol (`wget`) or
//! the `htar` protocol (`hsi`/`htar`, or `hsi get` plus `unzip` for zip
//! archives). The first file a store cannot provide ends that store's turn.

pub mod fetch;
pub mod stores;
pub mod template;

pub use fetch::{RetrievalSummary, RetrieveRequest, Retriever, clean_up_output_dir};
pub use stores::{AnlOrFcst, DataLocations, OneOrMany, StoreSpecs, load_data_locations};
pub use template::{TEMPLATE_KEYS, fhr_list, fill_template, parse_cycle};
