use std::{num::NonZeroUsize, path::Path, sync::Arc, thread, time::Duration};

use comms::{BatchReceiver, LearningRate, Mode, Msg};
use dataloader::{Dataset, ImageReader, LoaderErr, Producer, ProducerConfig, Sample};
use image::{Rgb, RgbImage};
use ndarray::Array3;

const SIDE: u32 = 6;
const INSIZE: usize = 4;

fn nz(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

fn config(
    batch_size: usize,
    val_batch_size: usize,
    epochs: usize,
    val_interval: usize,
) -> ProducerConfig {
    ProducerConfig {
        batch_size: nz(batch_size),
        val_batch_size: nz(val_batch_size),
        epochs,
        loader_jobs: nz(2),
        val_interval,
        lr_decay: 0.5,
        random_crop: false,
        flip: false,
        seed: Some(11),
    }
}

fn dataset(dir: &Path, prefix: &str, n: usize) -> Dataset {
    let samples = (0..n)
        .map(|i| {
            let path = dir.join(format!("{prefix}{i}.png"));
            RgbImage::from_pixel(SIDE, SIDE, Rgb([i as u8, 0, 255]))
                .save(&path)
                .unwrap();
            Sample {
                path,
                label: vec![i as f32 / 10.; 2],
            }
        })
        .collect();

    Dataset::from_samples(samples, 1).unwrap()
}

fn reader() -> ImageReader {
    let mean = Array3::zeros((3, SIDE as usize, SIDE as usize));
    ImageReader::new(Arc::new(mean), INSIZE).unwrap()
}

/// Drains the queue, turning every message into a short tag.
fn drain(rx: &mut BatchReceiver) -> Vec<String> {
    let mut seen = Vec::new();
    loop {
        match rx.recv_blocking().unwrap() {
            Msg::Data(batch) => {
                let (_, c, h, w) = batch.x.dim();
                assert_eq!((c, h, w), (3, INSIZE, INSIZE));
                seen.push(format!("data/{}", batch.len()));
            }
            Msg::Switch(Mode::Train) => seen.push("train".into()),
            Msg::Switch(Mode::Validate) => seen.push("val".into()),
            Msg::End => {
                seen.push("end".into());
                return seen;
            }
        }
    }
}

#[test]
fn validation_sweeps_interleave_with_training() {
    let dir = tempfile::tempdir().unwrap();
    let train = dataset(dir.path(), "t", 4);
    let val = dataset(dir.path(), "v", 2);
    let lr = LearningRate::new(1.0);

    let producer = Producer::new(config(2, 2, 2, 4), train, val, reader(), lr.clone()).unwrap();
    let (tx, mut rx) = comms::hand_off(1);
    let handle = thread::spawn(move || producer.run(&tx));

    let seen = drain(&mut rx);
    let stats = handle.join().unwrap().unwrap();

    let expected = [
        "train", "data/2", "data/2", "val", "data/2", "train", // epoch 1
        "data/2", "data/2", "val", "data/2", "train", // epoch 2
        "end",
    ];
    assert_eq!(seen, expected);
    assert_eq!(stats.batches, 4);
    assert_eq!(stats.val_sweeps, 2);
    assert_eq!(stats.val_batches, 2);
    assert_eq!(lr.get(), 0.25);
}

#[test]
fn partial_batches_carry_over_into_the_next_epoch() {
    let dir = tempfile::tempdir().unwrap();
    let train = dataset(dir.path(), "t", 3);
    let val = dataset(dir.path(), "v", 0);

    let lr = LearningRate::new(0.1);
    let producer = Producer::new(config(2, 1, 3, 0), train, val, reader(), lr).unwrap();
    let (tx, mut rx) = comms::hand_off(1);
    let handle = thread::spawn(move || producer.run(&tx));

    let seen = drain(&mut rx);
    let stats = handle.join().unwrap().unwrap();

    // 9 samples make 4 full batches and leave one behind
    assert_eq!(seen, ["train", "data/2", "data/2", "data/2", "data/2", "end"]);
    assert_eq!(stats.samples, 9);
    assert_eq!(stats.epochs, 3);
}

#[test]
fn producer_stays_one_batch_ahead_of_a_slow_consumer() {
    let dir = tempfile::tempdir().unwrap();
    let train = dataset(dir.path(), "t", 8);
    let val = dataset(dir.path(), "v", 0);

    let lr = LearningRate::new(0.1);
    let producer = Producer::new(config(1, 1, 2, 0), train, val, reader(), lr).unwrap();
    let (tx, mut rx) = comms::hand_off(1);
    let handle = thread::spawn(move || {
        producer.run(&tx).unwrap();
        tx.peak_depth()
    });

    let mut batches = 0;
    loop {
        thread::sleep(Duration::from_millis(5));
        match rx.recv_blocking().unwrap() {
            Msg::Data(_) => batches += 1,
            Msg::End => break,
            Msg::Switch(_) => {}
        }
    }

    assert_eq!(batches, 16);
    // One queued batch at most, another may be parked inside `send_blocking`. Reaching one
    // shows the producer ran ahead of the slow consumer.
    assert_eq!(handle.join().unwrap(), 1);
}

#[test]
fn unreadable_images_stop_the_producer() {
    let dir = tempfile::tempdir().unwrap();
    let train = Dataset::from_samples(
        vec![Sample {
            path: dir.path().join("missing.png"),
            label: vec![0.5, 0.5],
        }],
        1,
    )
    .unwrap();
    let val = dataset(dir.path(), "v", 0);

    let lr = LearningRate::new(0.1);
    let producer = Producer::new(config(1, 1, 1, 0), train, val, reader(), lr).unwrap();
    let (tx, mut rx) = comms::hand_off(1);
    let handle = thread::spawn(move || producer.run(&tx));

    assert!(matches!(rx.recv_blocking(), Ok(Msg::Switch(Mode::Train))));
    let result = handle.join().unwrap();
    assert!(matches!(result, Err(LoaderErr::Decode { .. })));
}

#[test]
fn validation_size_must_split_into_full_batches() {
    let dir = tempfile::tempdir().unwrap();
    let train = dataset(dir.path(), "t", 2);
    let val = dataset(dir.path(), "v", 3);

    let result = Producer::new(config(1, 2, 1, 1), train, val, reader(), LearningRate::new(0.1));
    assert!(matches!(result, Err(LoaderErr::Config(_))));
}
