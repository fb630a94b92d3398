//! Flash programming properties checked against the simulator

use proptest::prelude::*;
use selfprog_core::layout::{FlashGeometry, ReservedBlock};
use selfprog_core::sim::{Attiny104Sim, SimTiming};
use selfprog_core::{Diagnostics, RecordingOutput, Scenario};
use selfprog_hal::{MemoryAccess, NvmController};

fn block() -> ReservedBlock {
    ReservedBlock::at_end(FlashGeometry::ATTINY104, 2).unwrap()
}

/// Word-aligned addresses inside the reserved block
fn block_word() -> impl Strategy<Value = u16> {
    let block = block();
    (0..block.word_count()).prop_map(move |i| block.base() + i * 2)
}

fn timing() -> impl Strategy<Value = SimTiming> {
    (0u8..6, 0u8..6).prop_map(|(erase_polls, write_polls)| SimTiming {
        erase_polls,
        write_polls,
    })
}

proptest! {
    #[test]
    fn erase_then_write_reads_back(address in block_word(), value: u16, timing in timing()) {
        let mut nvm = Attiny104Sim::attiny104().with_timing(timing);
        nvm.write_word(address, 0x0000);
        nvm.erase_page(address | 1);
        nvm.write_word(address, value);
        prop_assert_eq!(nvm.read_word(address), value);
    }

    #[test]
    fn unerased_writes_accumulate_and(address in block_word(), first: u16, second: u16) {
        let mut nvm = Attiny104Sim::attiny104();
        nvm.erase_page(address | 1);
        nvm.write_word(address, first);
        nvm.write_word(address, second);
        prop_assert_eq!(nvm.read_word(address), first & second);
    }

    #[test]
    fn erase_sets_every_word_of_the_page(trigger_word in 0u16..8, values in prop::array::uniform8(any::<u16>())) {
        let page = block().base();
        let mut nvm = Attiny104Sim::attiny104();
        for (i, value) in values.iter().enumerate() {
            nvm.write_word(page + i as u16 * 2, *value);
        }

        nvm.erase_page(page + trigger_word * 2 + 1);

        for i in 0..8u16 {
            prop_assert_eq!(nvm.read_word(page + i * 2), 0xFFFF);
        }
    }

    #[test]
    fn low_byte_trigger_never_erases(trigger_word in 0u16..8, value: u16) {
        let page = block().base();
        let mut nvm = Attiny104Sim::attiny104();
        nvm.write_word(page, value);

        nvm.erase_page(page + trigger_word * 2);

        prop_assert_eq!(nvm.read_word(page), value);
        prop_assert_eq!(nvm.stats().erases, 0);
    }

    #[test]
    fn erase_leaves_other_pages_alone(page in 0u16..64, value: u16) {
        let geometry = FlashGeometry::ATTINY104;
        let target = geometry.page_address(page).unwrap();
        let mut nvm = Attiny104Sim::attiny104();
        for p in 0..geometry.page_count() {
            nvm.write_word(geometry.page_address(p).unwrap(), value);
        }

        nvm.erase_page(target + 1);

        for p in 0..geometry.page_count() {
            let expected = if p == page { 0xFFFF } else { value };
            prop_assert_eq!(nvm.read_word(geometry.page_address(p).unwrap()), expected);
        }
    }

    #[test]
    fn value_survives_restart(address in block_word(), value: u16) {
        let mut nvm = Attiny104Sim::attiny104();
        nvm.erase_page(address | 1);
        nvm.write_word(address, value);

        let mut nvm = Attiny104Sim::from_image(
            FlashGeometry::ATTINY104,
            *nvm.image(),
            0x0040,
        )
        .unwrap();
        prop_assert_eq!(nvm.read_word(address), value);
    }
}

#[test]
fn harness_scenarios_on_fresh_part() {
    let block = block();
    let mut diag = Diagnostics::new(Attiny104Sim::attiny104(), RecordingOutput::<64>::new(), &block).unwrap();

    let low = diag.run(Scenario::LowByteEraseIgnored);
    assert_eq!(low.displayed.as_slice(), &[0x1111, 0x1111]);

    let high = diag.run(Scenario::HighByteErase);
    assert_eq!(high.displayed.as_slice(), &[0x2222, 0xFFFF]);

    let adjacent = diag.run(Scenario::AdjacentWordErase);
    assert_eq!(adjacent.displayed.as_slice(), &[0x3333, 0xFFFF]);
}

#[test]
fn harness_erase_via_low_then_high_byte() {
    let block = block();
    let mut diag = Diagnostics::new(Attiny104Sim::attiny104(), RecordingOutput::<64>::new(), &block).unwrap();
    let a = diag.address();
    assert_eq!(a, 0x43E0);

    assert_eq!(diag.erase_write_and_show(a, 0x1111), Ok(0x1111));
    diag.nvm().erase_page(a);
    assert_eq!(diag.show_value(a), 0x1111);
    diag.nvm().erase_page(a + 1);
    assert_eq!(diag.show_value(a), 0xFFFF);
}

#[test]
fn stored_value_shows_after_power_cycle() {
    let block = block();
    let mut diag = Diagnostics::new(Attiny104Sim::attiny104(), RecordingOutput::<64>::new(), &block).unwrap();
    diag.erase_write_and_show(block.base(), 0x1234).unwrap();

    let (nvm, _) = diag.release();
    let mut diag = Diagnostics::new(nvm.restart(), RecordingOutput::<64>::new(), &block).unwrap();
    let report = diag.run(Scenario::ShowStored);
    assert_eq!(report.last(), Some(0x1234));
    assert_eq!(diag.output().nibbles(), &[1, 2, 3, 4]);
}
