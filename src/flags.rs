use std::path::PathBuf;

xflags::xflags! {
    /// Inspect RO-Crate metadata.
    cmd rocrate {
        /// TOML configuration file.
        optional -c, --config path: PathBuf

        /// Print the root, descriptor and entity count of a crate.
        cmd info {
            /// Crate directory or metadata file.
            required path: PathBuf
        }

        /// Print the root data entity as a nested tree.
        cmd tree {
            /// Crate directory or metadata file.
            required path: PathBuf
            /// Levels of references to expand.
            optional --depth depth: usize
            /// Keep expanding references that loop back.
            optional --allow-cycles
            /// Print plain values instead of {"@value": ..} objects.
            optional --no-value-object
        }

        /// Expand a vocabulary term to its IRI.
        cmd term {
            /// Crate directory or metadata file.
            required path: PathBuf
            /// Term to expand, e.g. `name` or `foaf:Person`.
            required term: String
        }
    }
}
