//! Starter module catalog
//!
//! Five reference modules with their jacks and controls. Seeding is
//! idempotent: a module already stored under the same (name, manufacturer)
//! is left untouched.

use europatch_common::Result;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::db::modules::{self, NewConnection, NewControl, NewModule};

struct CatalogEntry {
    name: &'static str,
    manufacturer: &'static str,
    hp_width: i64,
    module_type: &'static str,
    description: &'static str,
    manual_url: &'static str,
    image_url: &'static str,
    modulargrid_url: &'static str,
    jacks: &'static [NewConnection<'static>],
    controls: &'static [NewControl<'static>],
}

const fn input(name: &'static str, description: &'static str) -> NewConnection<'static> {
    NewConnection { name, connection_type: "input", description }
}

const fn output(name: &'static str, description: &'static str) -> NewConnection<'static> {
    NewConnection { name, connection_type: "output", description }
}

const fn knob(name: &'static str, description: &'static str, min: f64, max: f64, default: f64) -> NewControl<'static> {
    NewControl {
        control_type: "knob",
        control_name: name,
        description,
        min_value: min,
        max_value: max,
        default_value: default,
        is_attenuator: false,
        is_attenuverter: false,
    }
}

const fn attenuverter(name: &'static str, description: &'static str) -> NewControl<'static> {
    NewControl {
        is_attenuverter: true,
        ..knob(name, description, 0.0, 100.0, 50.0)
    }
}

const fn switch(name: &'static str, description: &'static str, max: f64) -> NewControl<'static> {
    NewControl {
        control_type: "switch",
        ..knob(name, description, 0.0, max, 0.0)
    }
}

const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        name: "Plaits",
        manufacturer: "Mutable Instruments",
        hp_width: 12,
        module_type: "Oscillator",
        description: "Macro-oscillator with multiple synthesis models",
        manual_url: "https://mutable-instruments.net/modules/plaits/manual/",
        image_url: "https://mutable-instruments.net/modules/plaits/images/plaits_front.jpg",
        modulargrid_url: "https://www.modulargrid.net/e/mutable-instruments-plaits",
        jacks: &[
            output("OUT", "Main audio output"),
            output("AUX", "Auxiliary audio output"),
            input("TRIG", "Trigger input"),
            input("PITCH", "V/Oct pitch input"),
            input("TIMBRE", "Timbre CV input"),
            input("MODEL", "Model selection CV input"),
        ],
        controls: &[
            knob("MODEL", "Selects synthesis model", 0.0, 15.0, 0.0),
            knob("TIMBRE", "Controls timbre/harmonic content", 0.0, 100.0, 50.0),
            knob("FREQ", "Controls frequency/pitch", 0.0, 100.0, 50.0),
            knob("HARMONICS", "Controls harmonic structure", 0.0, 100.0, 50.0),
            knob("MORPH", "Morphs between variations of the model", 0.0, 100.0, 50.0),
            switch("TRIGGER MODE", "Selects trigger mode", 1.0),
        ],
    },
    CatalogEntry {
        name: "Rings",
        manufacturer: "Mutable Instruments",
        hp_width: 14,
        module_type: "Resonator",
        description: "Modal resonator",
        manual_url: "https://mutable-instruments.net/modules/rings/manual/",
        image_url: "https://mutable-instruments.net/modules/rings/images/rings_front.jpg",
        modulargrid_url: "https://www.modulargrid.net/e/mutable-instruments-rings",
        jacks: &[
            input("IN", "Audio input"),
            output("OUT", "Main audio output"),
            output("ODD", "Odd harmonics output"),
            output("EVEN", "Even harmonics output"),
            input("STRUM", "Excitation input"),
            input("V/OCT", "V/Oct pitch input"),
            input("DAMPING", "Damping CV input"),
            input("POSITION", "Position CV input"),
        ],
        controls: &[
            knob("FREQUENCY", "Controls frequency/pitch", 0.0, 100.0, 50.0),
            knob("STRUCTURE", "Controls resonator structure", 0.0, 100.0, 50.0),
            knob("BRIGHTNESS", "Controls brightness/damping", 0.0, 100.0, 50.0),
            knob("POSITION", "Controls excitation position", 0.0, 100.0, 50.0),
            switch("RESONATOR", "Selects resonator type", 2.0),
            switch("POLYPHONY", "Selects polyphony mode", 2.0),
        ],
    },
    CatalogEntry {
        name: "Clouds",
        manufacturer: "Mutable Instruments",
        hp_width: 18,
        module_type: "Granular Processor",
        description: "Texture synthesizer",
        manual_url: "https://mutable-instruments.net/modules/clouds/manual/",
        image_url: "https://mutable-instruments.net/modules/clouds/images/clouds_front.jpg",
        modulargrid_url: "https://www.modulargrid.net/e/mutable-instruments-clouds",
        jacks: &[
            input("IN L", "Left audio input"),
            input("IN R", "Right audio input"),
            output("OUT L", "Left audio output"),
            output("OUT R", "Right audio output"),
            input("TRIG", "Trigger input"),
            input("FREEZE", "Freeze input"),
            input("POSITION", "Position CV input"),
            input("SIZE", "Size CV input"),
            input("DENSITY", "Density CV input"),
            input("TEXTURE", "Texture CV input"),
        ],
        controls: &[
            knob("POSITION", "Controls playback position", 0.0, 100.0, 50.0),
            knob("SIZE", "Controls grain size", 0.0, 100.0, 50.0),
            knob("DENSITY", "Controls grain density", 0.0, 100.0, 50.0),
            knob("TEXTURE", "Controls grain texture", 0.0, 100.0, 50.0),
            knob("BLEND", "Controls wet/dry mix", 0.0, 100.0, 50.0),
            knob("SPREAD", "Controls stereo spread", 0.0, 100.0, 50.0),
            knob("FEEDBACK", "Controls feedback amount", 0.0, 100.0, 0.0),
            knob("REVERB", "Controls reverb amount", 0.0, 100.0, 0.0),
            switch("QUALITY", "Selects audio quality", 1.0),
            switch("MODE", "Selects processing mode", 3.0),
        ],
    },
    CatalogEntry {
        name: "Maths",
        manufacturer: "Make Noise",
        hp_width: 20,
        module_type: "Function Generator",
        description: "Dual function generator with mixing and logic",
        manual_url: "http://www.makenoisemusic.com/manuals/MATHSmanual.pdf",
        image_url: "http://www.makenoisemusic.com/thumbs/modules/maths-panel-thumb.jpg",
        modulargrid_url: "https://www.modulargrid.net/e/make-noise-maths",
        jacks: &[
            output("CH 1 OUT", "Channel 1 output"),
            output("CH 4 OUT", "Channel 4 output"),
            input("CH 1 TRIG", "Channel 1 trigger input"),
            input("CH 4 TRIG", "Channel 4 trigger input"),
            output("OR", "OR logic output"),
            output("SUM", "SUM output"),
            output("UNITY", "UNITY output"),
            output("INV", "Inverted output"),
        ],
        controls: &[
            knob("RISE 1", "Channel 1 rise time", 0.0, 100.0, 50.0),
            knob("FALL 1", "Channel 1 fall time", 0.0, 100.0, 50.0),
            knob("RISE 4", "Channel 4 rise time", 0.0, 100.0, 50.0),
            knob("FALL 4", "Channel 4 fall time", 0.0, 100.0, 50.0),
            attenuverter("CHANNEL 1", "Channel 1 level"),
            attenuverter("CHANNEL 2", "Channel 2 level"),
            attenuverter("CHANNEL 3", "Channel 3 level"),
            attenuverter("CHANNEL 4", "Channel 4 level"),
            switch("CYCLE 1", "Channel 1 cycle mode", 1.0),
            switch("CYCLE 4", "Channel 4 cycle mode", 1.0),
        ],
    },
    CatalogEntry {
        name: "Pamela's NEW Workout",
        manufacturer: "ALM Busy Circuits",
        hp_width: 8,
        module_type: "Clock",
        description: "Advanced clocking module with multiple outputs",
        manual_url: "https://busycircuits.com/alm017/",
        image_url: "https://busycircuits.com/images/alm017.jpg",
        modulargrid_url: "https://www.modulargrid.net/e/alm-busy-circuits-pamela-s-new-workout",
        jacks: &[
            output("OUT 1", "Clock output 1"),
            output("OUT 2", "Clock output 2"),
            output("OUT 3", "Clock output 3"),
            output("OUT 4", "Clock output 4"),
            output("OUT 5", "Clock output 5"),
            output("OUT 6", "Clock output 6"),
            output("OUT 7", "Clock output 7"),
            output("OUT 8", "Clock output 8"),
            input("RESET", "Reset input"),
        ],
        controls: &[
            knob("BPM", "Master tempo", 1.0, 300.0, 120.0),
            knob("DIVISION 1", "Clock division for output 1", 1.0, 64.0, 1.0),
            knob("DIVISION 2", "Clock division for output 2", 1.0, 64.0, 2.0),
            knob("DIVISION 3", "Clock division for output 3", 1.0, 64.0, 4.0),
            knob("DIVISION 4", "Clock division for output 4", 1.0, 64.0, 8.0),
            knob("DIVISION 5", "Clock division for output 5", 1.0, 64.0, 16.0),
            knob("DIVISION 6", "Clock division for output 6", 1.0, 64.0, 32.0),
            knob("DIVISION 7", "Clock division for output 7", 1.0, 64.0, 3.0),
            knob("DIVISION 8", "Clock division for output 8", 1.0, 64.0, 6.0),
        ],
    },
];

/// Insert catalog modules that are not stored yet; returns how many were added
pub async fn seed_catalog(pool: &SqlitePool) -> Result<usize> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for entry in CATALOG {
        if modules::find_module(&mut tx, entry.name, entry.manufacturer).await?.is_some() {
            debug!(module = entry.name, "Catalog module already stored");
            continue;
        }

        let module = modules::insert_module(
            &mut tx,
            &NewModule {
                name: entry.name.to_string(),
                manufacturer: entry.manufacturer.to_string(),
                hp_width: Some(entry.hp_width),
                module_type: Some(entry.module_type.to_string()),
                description: Some(entry.description.to_string()),
                manual_url: Some(entry.manual_url.to_string()),
                image_url: Some(entry.image_url.to_string()),
                modulargrid_url: Some(entry.modulargrid_url.to_string()),
            },
        )
        .await?;

        for jack in entry.jacks {
            modules::insert_connection(&mut tx, module.id, jack).await?;
        }
        for control in entry.controls {
            modules::insert_control(&mut tx, module.id, control).await?;
        }
        inserted += 1;
    }

    tx.commit().await?;
    info!(inserted, total = CATALOG.len(), "Starter catalog seeded");
    Ok(inserted)
}
