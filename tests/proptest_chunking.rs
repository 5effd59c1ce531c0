//! Property-based checks that results do not depend on how input is chunked

mod fixtures;

use proptest::prelude::*;
use rattlescan::{
    analyzer::EntropyAccumulator, AnalysisConfig, AnalysisPipeline, DigestAccumulator,
    HashAlgorithm,
};

fn data_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..20_000)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Splitting the stream anywhere yields the same digests and entropy
    #[test]
    fn accumulators_ignore_split_points(data in data_strategy(), cuts in prop::collection::vec(any::<usize>(), 0..8)) {
        let mut whole_digests = DigestAccumulator::new(&HashAlgorithm::ALL);
        let mut whole_entropy = EntropyAccumulator::with_block_size(1024);
        whole_digests.update(&data).unwrap();
        whole_entropy.update(&data).unwrap();

        let mut points: Vec<usize> = cuts.iter().map(|c| if data.is_empty() { 0 } else { c % data.len() }).collect();
        points.push(0);
        points.push(data.len());
        points.sort_unstable();

        let mut split_digests = DigestAccumulator::new(&HashAlgorithm::ALL);
        let mut split_entropy = EntropyAccumulator::with_block_size(1024);
        for pair in points.windows(2) {
            let part = &data[pair[0]..pair[1]];
            split_digests.update(part).unwrap();
            split_entropy.update(part).unwrap();
        }

        prop_assert_eq!(whole_digests.finalize().unwrap(), split_digests.finalize().unwrap());
        prop_assert_eq!(whole_entropy.finalize().unwrap(), split_entropy.finalize().unwrap());
    }

    /// File-level analysis agrees across chunk sizes
    #[test]
    fn pipeline_ignores_chunk_size(data in data_strategy(), chunk in 512usize..8192) {
        let (_dir, path) = fixtures::write_temp("prop.bin", &data);

        let reference = AnalysisPipeline::new(AnalysisConfig {
            chunk_size: 1 << 20,
            ..AnalysisConfig::default()
        })
        .unwrap()
        .analyze(&path)
        .unwrap();

        let chunked = AnalysisPipeline::new(AnalysisConfig {
            chunk_size: chunk,
            parallel_fanout: chunk % 2 == 0,
            ..AnalysisConfig::default()
        })
        .unwrap()
        .analyze(&path)
        .unwrap();

        prop_assert_eq!(reference.bytes_processed, data.len() as u64);
        prop_assert_eq!(&reference.digests, &chunked.digests);
        prop_assert_eq!(&reference.entropy, &chunked.entropy);
        prop_assert_eq!(&reference.file_type, &chunked.file_type);
    }
}
