use clap::Parser;
use common_base::iterator::AsyncIterator;
use kobuta_format::{FileReader, ReadOptions};
use kobuta_storage::MmapReadableFile;
use serde::Deserialize;
use serde::Serialize;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Parser)]
#[clap(about, version, author)]
struct Config {
    #[clap(long)]
    pub path: String,

    /// Print at most this many records.
    #[clap(long)]
    pub records: Option<usize>,

    /// Skip chunk checksum verification.
    #[clap(long)]
    pub no_verify: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    println!("config: {:?}", config);
    if config.path.is_empty() {
        println!("path MUST not be empty!");
        return Ok(());
    }

    let options = ReadOptions::default().with_verify_chunk_checksums(!config.no_verify);
    let f = MmapReadableFile::open(config.path.as_str()).await?;
    let reader = FileReader::open_with_options(f, options).await?;

    // metadata
    {
        let metadata = reader.metadata();
        println!(
            "records={} chunks={} compression={}",
            metadata.record_count, metadata.chunk_count, metadata.compression_id
        );
        println!("schema: {}", metadata.schema);
    }

    // chunk index
    {
        let index = reader.chunk_index();
        for (i, entry) in index.entries().iter().enumerate() {
            let first = index.first_record(i).unwrap_or_default();
            println!("chunk {:06}> first={} {}", i, first, entry);

            let chunk = reader.read_chunk(i).await?;
            for (j, block) in chunk.block_index().iter().enumerate() {
                println!("    block {:04}> {}", j, block);
            }
        }
    }

    // records
    {
        let limit = config.records.unwrap_or(usize::MAX);
        let mut itr = reader.read_sequential();
        let mut i = 0;
        while i < limit {
            let record = match itr.try_next().await? {
                Some(record) => record,
                None => break,
            };
            let fields: Vec<String> = record.values().iter().map(|v| v.to_string()).collect();
            println!("{:010}>| {} |", i, fields.join(" | "));
            i += 1;
        }
    }

    reader.close().await?;
    Ok(())
}
