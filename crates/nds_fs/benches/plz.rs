use divan::AllocProfiler;

#[global_allocator]
static ALLOC: AllocProfiler = AllocProfiler::system();

fn main() {
    divan::main();
}

pub mod archive {
    use divan::Bencher;
    use std::io::{prelude::*, Cursor};
    use nds_fs::{Filesystem, PlzArchive, Stream};

    const FILE_COUNT: usize = 256;
    const FILE_SIZE: usize = 4 * 1024;

    fn build_archive() -> PlzArchive {
        let archive = PlzArchive::new();
        for i in 0..FILE_COUNT {
            let mut f = archive
                .open(format!("file_{i:03}.dat").as_str().into(), "wb+")
                .unwrap();
            f.write_all(&vec![(i % 256) as u8; FILE_SIZE]).unwrap();
            f.close().unwrap();
        }
        archive
    }

    fn get_input() -> Vec<u8> {
        build_archive().to_bytes().unwrap()
    }

    #[divan::bench]
    fn read(bencher: Bencher) {
        bencher.with_inputs(get_input).bench_refs(|data| {
            divan::black_box(PlzArchive::read(&mut Cursor::new(data)).unwrap());
        });
    }

    #[divan::bench]
    fn write(bencher: Bencher) {
        bencher.with_inputs(build_archive).bench_refs(|archive| {
            divan::black_box(archive.to_bytes().unwrap());
        });
    }

    #[divan::bench]
    fn access_file(bencher: Bencher) {
        bencher.with_inputs(build_archive).bench_refs(|archive| {
            let mut buffer = Vec::new();
            let mut f = archive.open("file_128.dat".into(), "rb").unwrap();
            f.read_to_end(&mut buffer).unwrap();
            divan::black_box(buffer);
        });
    }

    #[divan::bench(sample_count = 16)]
    fn compress_roundtrip(bencher: Bencher) {
        bencher.with_inputs(get_input).bench_refs(|data| {
            let packed = nds_fs::compression::compress(data, false).unwrap();
            divan::black_box(nds_fs::compression::decompress(&packed, None).unwrap());
        });
    }
}
