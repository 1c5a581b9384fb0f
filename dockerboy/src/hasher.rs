use blake3;
use std::hash::{Hash, Hasher};

use crate::models::RunRequest;

pub const LABEL_HASH: &str = "io.dockerboy.hash";

pub trait DigestHasher {
    fn input<I: Hash>(&mut self, input: I);
}

impl DigestHasher for blake3::Hasher {
    fn input<I: Hash>(&mut self, input: I) {
        struct StdHasher<'a>(&'a mut blake3::Hasher);

        impl<'a> Hasher for StdHasher<'a> {
            fn finish(&self) -> u64 {
                unreachable!("the digest is read from blake3 directly")
            }

            fn write(&mut self, bytes: &[u8]) {
                self.0.update(bytes);
            }
        }

        input.hash(&mut StdHasher(self))
    }
}

/// Digest of the parts of a run request that fix the container's shape.
/// The command, the labels and the flags a single run may override
/// (`interactive`, `post_removal`) are left out.
pub fn request_digest(request: &RunRequest) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.input(&request.image);
    hasher.input(&request.name);
    hasher.input(&request.host_dir);
    hasher.input(&request.container_dir);
    hasher.input(&request.ports);

    hasher.finalize().to_hex().to_string()
}
