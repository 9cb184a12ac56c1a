use clap::{ArgGroup, Parser};
use log::{debug, info, trace, warn};
use std::fs::File;
use std::io::{Read, Write};
use std::process::ExitCode;

//const HEATSHRINK_APP_BUFFER_SIZE: usize = 4096;
const HEATSHRINK_APP_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Parser)] // requires `derive` feature
#[clap(author, version, about, long_about = None)]
#[clap(group(ArgGroup::new("command").required(true).args(&["encode", "decode"])))]
struct Cli {
    #[clap(short = 'e', long = "encode", help = "Compress data")]
    encode: bool,

    #[clap(short = 'd', long = "decode", help = "Decompress data")]
    decode: bool,

    #[clap(
        short = 'v',
        long = "verbose",
        help = "Print input & output sizes, compression ratio, etc."
    )]
    verbose: bool,

    #[clap(
        short = 'w',
        long = "window",
        default_value_t = heatshrink::HEATSHRINK_DEFAULT_WINDOW_BITS,
        help = "Window size, in bits (4-15)"
    )]
    window: u8,

    #[clap(
        short = 'l',
        long = "lookahead",
        default_value_t = heatshrink::HEATSHRINK_DEFAULT_LOOKAHEAD_BITS,
        help = "Lookahead size, in bits (3..window)"
    )]
    lookahead: u8,

    /// some regular input
    #[clap(group = "input")]
    input_file: Option<String>,

    /// some regular output
    #[clap(group = "output")]
    output_file: Option<String>,
}

fn report(file_name: &str, input_file: &File, output_file: &File, window: u8, lookahead: u8) {
    let input_len = input_file.metadata().unwrap().len();
    let output_len = output_file.metadata().unwrap().len();

    println!(
        "{0:} {1:.2}% \t{2:} -> {3:} (-w {4:} -l {5:})",
        file_name,
        100.0 - (100.0 * output_len as f32) / input_len as f32,
        input_len,
        output_len,
        window,
        lookahead
    );
}

fn encode(mut input_file: &File, mut output_file: &File, window: u8, lookahead: u8) -> Result<(), String> {
    let mut input_buffer = [0u8; HEATSHRINK_APP_BUFFER_SIZE];
    let mut output_buffer = [0u8; HEATSHRINK_APP_BUFFER_SIZE];
    let mut encoding_is_complete = false;

    let mut enc = heatshrink::encoder::HeatshrinkEncoder::new(window, lookahead)
        .ok_or_else(|| format!("invalid encoder parameters: -w {window} -l {lookahead}"))?;

    let mut poll_calls = 0u64;

    loop {
        let input_bytes_read = input_file.read(&mut input_buffer[0..]).unwrap();

        let mut input_bytes_processed = 0;

        loop {
            if input_bytes_read > 0 {
                let mut segment_input_size = 0;
                match enc.sink(
                    &input_buffer[input_bytes_processed..input_bytes_read],
                    &mut segment_input_size,
                ) {
                    heatshrink::HSsinkRes::SinkOK => {
                        input_bytes_processed += segment_input_size;
                    }
                    heatshrink::HSsinkRes::SinkFull => {
                        return Err("input buffer is full and unprocessed".into());
                    }
                    heatshrink::HSsinkRes::SinkErrorMisuse => {
                        return Err("encoder misuse in sink()".into());
                    }
                }
            }

            let mut output_bytes_processed = 0;

            loop {
                let mut segment_output_size = 0;
                poll_calls += 1;
                match enc.poll(&mut output_buffer[0..], &mut segment_output_size) {
                    heatshrink::HSpollRes::PollMore => {
                        trace!("encode: poll() #{poll_calls} produced {segment_output_size} bytes, requesting more");
                        if segment_output_size != 0 {
                            output_bytes_processed = segment_output_size;
                            output_file
                                .write_all(&output_buffer[0..output_bytes_processed])
                                .unwrap();
                        }
                    }
                    heatshrink::HSpollRes::PollEmpty => {
                        if segment_output_size != 0 {
                            output_bytes_processed = segment_output_size;
                            output_file
                                .write_all(&output_buffer[0..output_bytes_processed])
                                .unwrap();
                        }
                        break;
                    }
                    heatshrink::HSpollRes::PollErrorMisuse => {
                        return Err("encoder misuse in poll()".into());
                    }
                }
            }

            if input_bytes_read == 0 && output_bytes_processed == 0 {
                if let heatshrink::HSfinishRes::FinishDone = enc.finish() {
                    encoding_is_complete = true;
                    break;
                }
            }

            if input_bytes_read == input_bytes_processed {
                break;
            }
        }

        if encoding_is_complete {
            break;
        }
    }

    debug!("encode: {poll_calls} poll() calls");
    Ok(())
}

fn decode(mut input_file: &File, mut output_file: &File, input_buffer_size: usize, window: u8, lookahead: u8) -> Result<(), String> {
    let mut input_buffer = [0u8; HEATSHRINK_APP_BUFFER_SIZE];
    let mut output_buffer = [0u8; HEATSHRINK_APP_BUFFER_SIZE];

    let mut dec = heatshrink::decoder::HeatshrinkDecoder::new(input_buffer_size, window, lookahead)
        .ok_or_else(|| format!("invalid decoder parameters: -w {window} -l {lookahead}"))?;

    let mut output_bytes_processed = 0;
    let mut poll_calls = 0u64;

    loop {
        let input_bytes_read = input_file.read(&mut input_buffer).unwrap();

        if input_bytes_read == 0 {
            match dec.finish() {
                heatshrink::HSfinishRes::FinishDone => {
                    if output_bytes_processed != 0 {
                        output_file
                            .write_all(&output_buffer[0..output_bytes_processed])
                            .unwrap();
                    }
                    break;
                }
                heatshrink::HSfinishRes::FinishMore => {}
            }
        }

        let mut input_bytes_processed = 0;

        while input_bytes_processed < input_bytes_read {
            match dec.sink(&input_buffer[input_bytes_processed..input_bytes_read]) {
                (heatshrink::HSsinkRes::SinkOK, segment_input_size) => {
                    input_bytes_processed += segment_input_size;
                }
                (heatshrink::HSsinkRes::SinkFull, _) => {
                    return Err("input buffer is full and unprocessed".into());
                }
                (heatshrink::HSsinkRes::SinkErrorMisuse, _) => {
                    return Err("decoder misuse in sink()".into());
                }
            }

            loop {
                poll_calls += 1;
                match dec.poll(&mut output_buffer[output_bytes_processed..]) {
                    (heatshrink::HSpollRes::PollMore, segment_output_size) => {
                        trace!("decode: poll() #{poll_calls} produced {segment_output_size} bytes, requesting more");
                        output_bytes_processed += segment_output_size;
                        output_file
                            .write_all(&output_buffer[0..output_bytes_processed])
                            .unwrap();
                        output_bytes_processed = 0;
                    }
                    (heatshrink::HSpollRes::PollEmpty, segment_output_size) => {
                        output_bytes_processed += segment_output_size;
                        break;
                    }
                    (heatshrink::HSpollRes::PollErrorMisuse, _) => {
                        return Err("decoder misuse in poll()".into());
                    }
                }
            }
        }

        if input_bytes_read == 0 {
            break;
        }
    }

    debug!("decode: {poll_calls} poll() calls");
    Ok(())
}

fn main() -> ExitCode {
    let args = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .init();

    if args.lookahead >= args.window
        || args.window < heatshrink::HEATSHRINK_MIN_WINDOW_BITS
        || args.window > heatshrink::HEATSHRINK_MAX_WINDOW_BITS
        || args.lookahead < heatshrink::HEATSHRINK_MIN_LOOKAHEAD_BITS
    {
        eprintln!(
            "heatshrink: invalid parameters: -w {} -l {} (need 4 <= w <= 15 and 3 <= l < w)",
            args.window, args.lookahead
        );
        return ExitCode::FAILURE;
    }

    let input_path = args.input_file.as_ref().unwrap();
    let output_path = args.output_file.as_ref().unwrap();

    info!("opening {input_path}");
    let input_file = File::open(input_path).unwrap();
    let output_file = File::create(output_path).unwrap();

    let result = if args.encode {
        encode(&input_file, &output_file, args.window, args.lookahead)
    } else {
        decode(
            &input_file,
            &output_file,
            heatshrink::HEATSHRINK_DEFAULT_INPUT_BUFFER_SIZE,
            args.window,
            args.lookahead,
        )
    };

    if let Err(msg) = result {
        warn!("heatshrink: {msg}");
        eprintln!("heatshrink: {msg}");
        return ExitCode::FAILURE;
    }

    if args.verbose {
        report(input_path, &input_file, &output_file, args.window, args.lookahead);
    }

    ExitCode::SUCCESS
}
