//! The I/O boundary: opening the input SAM (file or stdin) and the output
//! FASTQ (file, gzip file, or stdout). This is a deliberately small subset
//! of the teacher's `io::open_options` builder layer — this crate has a
//! single input and a single output, so the generality that layer buys for
//! paired/unpaired, multi-format subcommands isn't earned here. See
//! `DESIGN.md`.

pub mod fastq;

use crate::utils::whichever::define_whichever;
use flate2::{Compression, write::GzEncoder};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Stdin, Stdout, stdin, stdout},
    path::Path,
};

define_whichever! {
    #[doc="Either a regular file or stdin, selected by the `-` convention."]
    pub(crate) enum ReadFileStdin {
        File(BufReader<File>),
        Stdin(BufReader<Stdin>),
    }

    impl Read for ReadFileStdin {},
    impl BufRead for ReadFileStdin {}
}

define_whichever! {
    #[doc="A writer for a regular uncompressed file, a gzip file, or stdout."]
    pub(crate) enum WriteFileZipStdout {
        File(BufWriter<File>),
        Zipped(GzEncoder<BufWriter<File>>),
        Stdout(BufWriter<Stdout>),
    }

    impl Write for WriteFileZipStdout {}
}

/// Opens the input SAM stream. `"-"` means stdin.
///
/// ## Errors
///
/// `path` must exist and be readable unless it is `"-"`.
pub(crate) fn open_input(path: &str) -> std::io::Result<ReadFileStdin> {
    if path == "-" {
        Ok(ReadFileStdin::Stdin(BufReader::new(stdin())))
    } else {
        Ok(ReadFileStdin::File(BufReader::new(File::open(path)?)))
    }
}

/// Opens the output FASTQ stream. `None` means stdout; a `.gz` extension
/// opts into gzip compression.
///
/// ## Errors
///
/// Creating `path` must succeed, if given.
pub(crate) fn create_output<P: AsRef<Path>>(path: Option<P>) -> std::io::Result<WriteFileZipStdout> {
    let writer = match path {
        Some(ref p) => {
            let is_gz = p.as_ref().extension().is_some_and(|ext| ext == "gz");
            let file = File::create(p)?;
            let buf_writer = BufWriter::new(file);

            if is_gz {
                WriteFileZipStdout::Zipped(GzEncoder::new(buf_writer, Compression::default()))
            } else {
                WriteFileZipStdout::File(buf_writer)
            }
        }
        None => WriteFileZipStdout::Stdout(BufWriter::new(stdout())),
    };

    Ok(writer)
}
