use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use comms::{CommsErr, Mode, Msg, Report};

#[test]
fn hand_off_preserves_order() {
    let (tx, mut rx) = comms::hand_off::<u32>(1);

    let producer = thread::spawn(move || {
        tx.send_blocking(Msg::Switch(Mode::Train))?;
        for i in 0..5 {
            tx.send_blocking(Msg::Data(i))?;
        }
        tx.send_blocking(Msg::End)
    });

    assert!(matches!(rx.recv_blocking(), Ok(Msg::Switch(Mode::Train))));
    for i in 0..5 {
        match rx.recv_blocking() {
            Ok(Msg::Data(got)) => assert_eq!(got, i),
            other => panic!("unexpected msg: {other:?}"),
        }
    }
    assert!(matches!(rx.recv_blocking(), Ok(Msg::End)));

    producer.join().unwrap().unwrap();
}

#[test]
fn bounded_queue_never_holds_more_than_its_capacity() {
    const MSGS: usize = 20;

    let (tx, mut rx) = comms::hand_off::<usize>(1);
    let sent = Arc::new(AtomicUsize::new(0));

    let producer = {
        let sent = Arc::clone(&sent);
        thread::spawn(move || {
            for i in 0..MSGS {
                tx.send_blocking(Msg::Data(i)).unwrap();
                sent.fetch_add(1, Ordering::SeqCst);
            }
            tx.send_blocking(Msg::End).unwrap();
            tx.peak_depth()
        })
    };

    // A slow consumer lets the producer run ahead as far as the queue allows.
    let mut received = 0;
    loop {
        thread::sleep(Duration::from_millis(2));
        match rx.recv_blocking().unwrap() {
            Msg::Data(_) => received += 1,
            Msg::End => break,
            Msg::Switch(_) => {}
        }

        // Besides the received ones, only the single queued message can have been sent.
        assert!(sent.load(Ordering::SeqCst) <= received + 1);
    }

    assert_eq!(received, MSGS);
    assert_eq!(producer.join().unwrap(), 1);
}

#[test]
fn receiver_reports_closed_sender() {
    let (tx, mut rx) = comms::unbounded::<Report>();
    tx.send_blocking(Msg::Data(Report {
        loss: 0.5,
        accuracy: 0.25,
    }))
    .unwrap();
    drop(tx);

    assert!(matches!(rx.recv_blocking(), Ok(Msg::Data(_))));
    assert!(matches!(
        rx.recv_blocking(),
        Err(CommsErr::Closed { side: "sending" })
    ));
}

#[tokio::test]
async fn sender_reports_closed_receiver() {
    let (tx, rx) = comms::hand_off::<()>(1);
    drop(rx);

    assert!(matches!(
        tx.send(Msg::End).await,
        Err(CommsErr::Closed { side: "receiving" })
    ));
}
