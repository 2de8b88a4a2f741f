//! Coder graph resolution.
//!
//! A folder's coders form a small dataflow graph. Every coder owns a
//! contiguous range of folder-wide input ids and output ids, assigned in
//! coder order. Bind pairs connect an output id to an input id; the inputs
//! left over are fed by packed streams. Decoding starts from the primary
//! output and pulls each input either from the coder bound to it or from the
//! packed stream assigned to it.
//!
//! Resolution is recursive but bounded: every output id is resolved at most
//! once and the recursion never goes deeper than the number of coders, so a
//! cyclic or self-overlapping graph fails instead of looping.

use std::io::Read;
use std::ops::Range;

use log::trace;

use super::{CodecRegistry, PasswordProvider};
use crate::format::streams::Folder;
use crate::{Error, Result};

/// Id ranges for one coder.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CoderSlots {
    inputs: Range<u64>,
    outputs: Range<u64>,
}

/// A validated view over a folder's coder wiring.
#[derive(Debug)]
pub struct CoderGraph<'f> {
    folder: &'f Folder,
    slots: Vec<CoderSlots>,
    primary_output: u64,
}

impl<'f> CoderGraph<'f> {
    /// Validates the folder and assigns stream id ranges to its coders.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] if the folder wiring is inconsistent.
    pub fn new(folder: &'f Folder) -> Result<Self> {
        folder.validate()?;

        let mut next_in = 0;
        let mut next_out = 0;
        let slots = folder
            .coders
            .iter()
            .map(|coder| {
                let slot = CoderSlots {
                    inputs: next_in..next_in + coder.num_in_streams,
                    outputs: next_out..next_out + coder.num_out_streams,
                };
                next_in = slot.inputs.end;
                next_out = slot.outputs.end;
                slot
            })
            .collect();

        Ok(Self {
            folder,
            slots,
            primary_output: folder.primary_output()?,
        })
    }

    /// Returns the id of the output that carries the folder's decoded data.
    pub fn primary_output(&self) -> u64 {
        self.primary_output
    }

    /// Returns the index of the coder owning an output id.
    pub fn coder_for_output(&self, out_id: u64) -> Option<usize> {
        self.slots.iter().position(|s| s.outputs.contains(&out_id))
    }

    /// Returns the input ids owned by a coder.
    pub fn input_ids(&self, coder_index: usize) -> Option<Range<u64>> {
        self.slots.get(coder_index).map(|s| s.inputs.clone())
    }

    /// Builds the decoder for the folder's primary output.
    ///
    /// `packed` holds one reader per packed stream, in the folder's packed
    /// stream order. Each is consumed by exactly one coder input.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidFormat`] if the packed stream count is wrong, an
    ///   output is reached twice, an input has no source, or the graph is
    ///   deeper than its coder count
    /// - [`Error::UnsupportedFeature`] for coders with several outputs
    /// - any error from [`CodecRegistry::decoder`]
    pub fn build_decoder<'a>(
        &self,
        packed: Vec<Box<dyn Read + 'a>>,
        registry: &CodecRegistry,
        password: Option<&dyn PasswordProvider>,
    ) -> Result<Box<dyn Read + 'a>> {
        if packed.len() != self.folder.packed_streams.len() {
            return Err(Error::InvalidFormat(format!(
                "folder expects {} packed streams, got {}",
                self.folder.packed_streams.len(),
                packed.len()
            )));
        }

        let mut resolution = Resolution {
            graph: self,
            registry,
            password,
            packed: packed.into_iter().map(Some).collect(),
            resolved: vec![false; self.folder.total_out_streams() as usize],
        };
        resolution.resolve(self.primary_output, 0)
    }
}

/// State for one decoder build.
struct Resolution<'g, 'f, 'a> {
    graph: &'g CoderGraph<'f>,
    registry: &'g CodecRegistry,
    password: Option<&'g dyn PasswordProvider>,
    packed: Vec<Option<Box<dyn Read + 'a>>>,
    resolved: Vec<bool>,
}

impl<'a> Resolution<'_, '_, 'a> {
    fn resolve(&mut self, out_id: u64, depth: usize) -> Result<Box<dyn Read + 'a>> {
        let folder = self.graph.folder;
        if depth > folder.coders.len() {
            return Err(Error::InvalidFormat("coder graph is cyclic".into()));
        }

        let slot = self
            .resolved
            .get_mut(out_id as usize)
            .ok_or_else(|| Error::InvalidFormat(format!("output stream {out_id} out of range")))?;
        if std::mem::replace(slot, true) {
            return Err(Error::InvalidFormat(format!(
                "output stream {out_id} is consumed more than once"
            )));
        }

        let coder_index = self
            .graph
            .coder_for_output(out_id)
            .ok_or_else(|| Error::InvalidFormat(format!("no coder owns output stream {out_id}")))?;
        let coder = &folder.coders[coder_index];
        if coder.num_out_streams != 1 {
            return Err(Error::UnsupportedFeature {
                feature: "coders with several output streams",
            });
        }

        let mut inputs = Vec::with_capacity(coder.num_in_streams as usize);
        for in_id in self.graph.slots[coder_index].inputs.clone() {
            let input = match folder.find_bind_pair_for_in_stream(in_id) {
                Some(bp) => self.resolve(bp.out_index, depth + 1)?,
                None => self.take_packed(in_id)?,
            };
            inputs.push(input);
        }

        let unpack_size = folder.unpack_sizes.get(out_id as usize).copied().ok_or_else(|| {
            Error::InvalidFormat(format!("no unpack size for output stream {out_id}"))
        })?;

        trace!(
            "coder {coder_index} feeds output {out_id} ({unpack_size} bytes) from {} inputs",
            inputs.len()
        );
        self.registry
            .decoder(coder, inputs, unpack_size, self.password)
    }

    fn take_packed(&mut self, in_id: u64) -> Result<Box<dyn Read + 'a>> {
        let index = self
            .graph
            .folder
            .find_packed_stream_index(in_id)
            .ok_or_else(|| Error::InvalidFormat(format!("input stream {in_id} has no source")))?;
        self.packed
            .get_mut(index)
            .and_then(Option::take)
            .ok_or_else(|| Error::InvalidFormat(format!("packed stream {index} used twice")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Codec, Decoder, Encoder, method};
    use crate::format::streams::{BindPair, Coder};
    use std::io::{self, Cursor, Write};

    fn boxed(data: &[u8]) -> Box<dyn Read + '_> {
        Box::new(Cursor::new(data))
    }

    fn read_all(mut r: Box<dyn Read + '_>) -> Vec<u8> {
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        out
    }

    /// Two-input test coder that concatenates its inputs.
    struct JoinCodec;

    struct JoinDecoder<'a>(Box<dyn Read + 'a>);

    impl Read for JoinDecoder<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.read(buf)
        }
    }

    impl Decoder for JoinDecoder<'_> {
        fn method_id(&self) -> &'static [u8] {
            &[0x7E]
        }
    }

    impl Codec for JoinCodec {
        fn method_id(&self) -> &'static [u8] {
            &[0x7E]
        }

        fn name(&self) -> &'static str {
            "Join"
        }

        fn decoder<'a>(
            &self,
            inputs: Vec<Box<dyn Read + 'a>>,
            _properties: &[u8],
            _unpack_size: u64,
            _password: Option<&str>,
        ) -> Result<Box<dyn Decoder + 'a>> {
            let mut joined: Box<dyn Read + 'a> = Box::new(io::empty());
            for input in inputs {
                joined = Box::new(joined.chain(input));
            }
            Ok(Box::new(JoinDecoder(joined)))
        }

        fn encoder<'a>(
            &self,
            _output: Box<dyn Write + 'a>,
            _level: u32,
        ) -> Result<Box<dyn Encoder + 'a>> {
            Err(Error::UnsupportedMethod { method_id: 0x7E })
        }
    }

    fn join_coder() -> Coder {
        Coder {
            method_id: vec![0x7E],
            num_in_streams: 2,
            num_out_streams: 1,
            properties: None,
        }
    }

    #[test]
    fn test_single_coder() {
        let mut folder = Folder::single(Coder::simple(method::COPY, None));
        folder.unpack_sizes = vec![3];
        let graph = CoderGraph::new(&folder).unwrap();
        assert_eq!(graph.primary_output(), 0);

        let registry = CodecRegistry::default();
        let decoder = graph.build_decoder(vec![boxed(b"abcdef")], &registry, None).unwrap();
        assert_eq!(read_all(decoder), b"abc");
    }

    #[test]
    fn test_chain_uses_per_output_sizes() {
        // coder 0 (copy, 4 bytes) <- coder 1 (copy, 6 bytes) <- packed
        let mut folder = Folder::new(
            vec![
                Coder::simple(method::COPY, None),
                Coder::simple(method::COPY, None),
            ],
            vec![BindPair {
                in_index: 0,
                out_index: 1,
            }],
            vec![1],
        )
        .unwrap();
        folder.unpack_sizes = vec![4, 6];

        let graph = CoderGraph::new(&folder).unwrap();
        assert_eq!(graph.coder_for_output(1), Some(1));
        assert_eq!(graph.input_ids(1), Some(1..2));

        let registry = CodecRegistry::default();
        let decoder = graph
            .build_decoder(vec![boxed(b"0123456789")], &registry, None)
            .unwrap();
        assert_eq!(read_all(decoder), b"0123");
    }

    #[test]
    fn test_multi_input_coder_mixes_bound_and_packed() {
        // join(in 0, in 1) where in 0 <- copy(out 1) <- packed[1], in 1 <- packed[0]
        let mut folder = Folder::new(
            vec![join_coder(), Coder::simple(method::COPY, None)],
            vec![BindPair {
                in_index: 0,
                out_index: 1,
            }],
            vec![1, 2],
        )
        .unwrap();
        folder.unpack_sizes = vec![6, 3];

        let registry = CodecRegistry::default().register(JoinCodec);
        let graph = CoderGraph::new(&folder).unwrap();
        let decoder = graph
            .build_decoder(vec![boxed(b"xyz"), boxed(b"abc")], &registry, None)
            .unwrap();
        assert_eq!(read_all(decoder), b"abcxyz");
    }

    #[test]
    fn test_packed_stream_count_mismatch() {
        let mut folder = Folder::single(Coder::simple(method::COPY, None));
        folder.unpack_sizes = vec![0];
        let graph = CoderGraph::new(&folder).unwrap();
        let err = graph
            .build_decoder(vec![], &CodecRegistry::default(), None)
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn test_missing_unpack_size() {
        let folder = Folder::single(Coder::simple(method::COPY, None));
        let graph = CoderGraph::new(&folder).unwrap();
        let err = graph
            .build_decoder(vec![boxed(b"")], &CodecRegistry::default(), None)
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn test_multi_output_coder_is_unsupported() {
        let splitter = Coder {
            method_id: vec![0x7D],
            num_in_streams: 1,
            num_out_streams: 2,
            properties: None,
        };
        let mut folder = Folder::new(
            vec![splitter, Coder::simple(method::COPY, None)],
            vec![
                BindPair {
                    in_index: 1,
                    out_index: 1,
                },
                BindPair {
                    in_index: 0,
                    out_index: 2,
                },
            ],
            vec![],
        )
        .unwrap();
        folder.unpack_sizes = vec![1, 1, 1];

        let graph = CoderGraph::new(&folder).unwrap();
        let err = graph
            .build_decoder(vec![], &CodecRegistry::default(), None)
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnsupportedFeature { .. }));
    }

    #[test]
    fn test_unreachable_self_loop_is_ignored() {
        let folder = Folder {
            coders: vec![
                Coder::simple(method::COPY, None),
                Coder::simple(method::COPY, None),
            ],
            bind_pairs: vec![BindPair {
                in_index: 1,
                out_index: 1,
            }],
            packed_streams: vec![0],
            unpack_sizes: vec![1, 1],
            unpack_crc: None,
        };
        let graph = CoderGraph::new(&folder).unwrap();
        let decoder = graph
            .build_decoder(vec![boxed(b"a")], &CodecRegistry::default(), None)
            .unwrap();
        assert_eq!(read_all(decoder), b"a");
    }

    #[test]
    fn test_self_bound_primary_is_rejected() {
        let folder = Folder {
            coders: vec![Coder::simple(method::COPY, None)],
            bind_pairs: vec![BindPair {
                in_index: 0,
                out_index: 0,
            }],
            packed_streams: vec![],
            unpack_sizes: vec![1],
            unpack_crc: None,
        };
        assert!(matches!(
            CoderGraph::new(&folder).err(),
            Some(Error::InvalidFormat(_))
        ));
    }
}
