use std::any::Any;

use lazy_static::lazy_static;

use crate::data::{AudioBuffer, DataReadReference, DataReferenceCollection, DataWriteReference};
use crate::interface::{NodeClassMetadata, NodeClassName, VertexInterface};
use crate::parameters::{DataType, DescriptorError, Literal, ParameterDescriptor};
use crate::processing::{BuildErrors, BuildOperatorParams, Operator, OperatorClass, OperatorSettings};

use super::{PLUGIN_AUTHOR, PLUGIN_NODE_MISSING_PROMPT, STANDARD_NAMESPACE};

pub mod vertex_names {
    pub const INPUT_1: &str = "In1";
    pub const INPUT_2: &str = "In2";
    pub const OUTPUT: &str = "Out";
}

use vertex_names::*;

lazy_static! {
    static ref CLASS_INFO: Result<NodeClassMetadata, DescriptorError> = build_class_info();
}

fn build_class_info() -> Result<NodeClassMetadata, DescriptorError> {
    // 未接続の入力は無音として扱う
    let interface = VertexInterface::new(
        vec![
            ParameterDescriptor::new(INPUT_1, DataType::Audio)?
                .with_description("First audio input.")
                .with_default(Literal::Float(0.0)),
            ParameterDescriptor::new(INPUT_2, DataType::Audio)?
                .with_description("Second audio input.")
                .with_default(Literal::Float(0.0)),
        ],
        vec![ParameterDescriptor::new(OUTPUT, DataType::Audio)?
            .with_description("Sample-wise sum of both inputs.")],
    )?;

    Ok(NodeClassMetadata::new(
        NodeClassName::new(STANDARD_NAMESPACE, "Add", "Audio"),
        1,
        0,
        interface,
    )
    .with_display_name("Add (Audio)")
    .with_description("Adds two audio buffers sample by sample")
    .with_author(PLUGIN_AUTHOR)
    .with_prompt_if_missing(PLUGIN_NODE_MISSING_PROMPT)
    .with_category(&["Math"])
    .with_keywords(&["add", "mix", "+"]))
}

/// サンプル単位で2つのオーディオバッファを加算する
pub struct AudioAddOperator {
    info: &'static NodeClassMetadata,
    input_1: DataReadReference<AudioBuffer>,
    input_2: DataReadReference<AudioBuffer>,
    output: DataWriteReference<AudioBuffer>,
}

impl AudioAddOperator {
    pub fn new(
        info: &'static NodeClassMetadata,
        settings: &OperatorSettings,
        input_1: DataReadReference<AudioBuffer>,
        input_2: DataReadReference<AudioBuffer>,
    ) -> Self {
        let mut operator = Self {
            info,
            input_1,
            input_2,
            output: DataWriteReference::new(AudioBuffer::silence(settings.block_size())),
        };
        operator.execute();
        operator
    }

    pub fn output(&self) -> DataReadReference<AudioBuffer> {
        self.output.to_read_reference()
    }
}

/// 短い入力は足りない分を 0 とみなす
fn mix_into(output: &mut [f32], a: &[f32], b: &[f32]) {
    for (i, sample) in output.iter_mut().enumerate() {
        let x = a.get(i).copied().unwrap_or(0.0);
        let y = b.get(i).copied().unwrap_or(0.0);
        *sample = x + y;
    }
}

impl OperatorClass for AudioAddOperator {
    fn class_info() -> Result<&'static NodeClassMetadata, DescriptorError> {
        CLASS_INFO.as_ref().map_err(Clone::clone)
    }

    fn create_operator(params: &BuildOperatorParams) -> Result<Self, BuildErrors> {
        let info = Self::class_info()?;

        let mut errors = BuildErrors::new();
        let in1 = params.get_or_create_default_read::<AudioBuffer>(&info.interface, INPUT_1, &mut errors);
        let in2 = params.get_or_create_default_read::<AudioBuffer>(&info.interface, INPUT_2, &mut errors);

        match (in1, in2) {
            (Some(in1), Some(in2)) if errors.is_empty() => {
                Ok(Self::new(info, &params.settings, in1, in2))
            }
            _ => Err(errors),
        }
    }
}

impl Operator for AudioAddOperator {
    fn node_info(&self) -> &'static NodeClassMetadata {
        self.info
    }

    fn get_inputs(&self) -> DataReferenceCollection {
        let mut inputs = DataReferenceCollection::new();
        inputs.add_read_reference(INPUT_1, &self.input_1);
        inputs.add_read_reference(INPUT_2, &self.input_2);
        inputs
    }

    fn get_outputs(&self) -> DataReferenceCollection {
        let mut outputs = DataReferenceCollection::new();
        outputs.add_write_reference(OUTPUT, &self.output);
        outputs
    }

    fn execute(&mut self) {
        let mut out = self.output.write();

        // 同じスロットが両方の入力にバインドされている場合は1回だけ読む
        if self.input_1.ptr_eq(&self.input_2) {
            let a = self.input_1.read();
            mix_into(out.as_mut_slice(), a.as_slice(), a.as_slice());
            return;
        }

        let a = self.input_1.read();
        let b = self.input_2.read();
        mix_into(out.as_mut_slice(), a.as_slice(), b.as_slice());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> OperatorSettings {
        OperatorSettings::new(48000.0, 4).unwrap()
    }

    #[test]
    fn test_unbound_inputs_are_silence() {
        let params = BuildOperatorParams::new(settings(), DataReferenceCollection::new());
        let operator = AudioAddOperator::create_operator(&params).unwrap();

        assert_eq!(operator.output().read().as_slice(), &[0.0; 4]);
    }

    #[test]
    fn test_adds_samples() {
        let mut in1 = DataWriteReference::new(AudioBuffer::from_samples(vec![0.25, 0.5, 0.75, 1.0]));
        let in2 = DataWriteReference::new(AudioBuffer::filled(4, 1.0));

        let mut inputs = DataReferenceCollection::new();
        inputs.add_read_reference(INPUT_1, &in1.to_read_reference());
        inputs.add_read_reference(INPUT_2, &in2.to_read_reference());

        let mut operator =
            AudioAddOperator::create_operator(&BuildOperatorParams::new(settings(), inputs)).unwrap();
        assert_eq!(operator.output().read().as_slice(), &[1.25, 1.5, 1.75, 2.0]);

        in1.write().as_mut_slice()[0] = -1.0;
        operator.execute();
        assert_eq!(operator.output().read()[0], 0.0);
    }

    #[test]
    fn test_short_input_is_zero_padded() {
        let mut out = [9.0f32; 4];
        mix_into(&mut out, &[1.0, 2.0], &[0.5, 0.5, 0.5, 0.5]);
        assert_eq!(out, [1.5, 2.5, 0.5, 0.5]);
    }

    #[test]
    fn test_same_slot_on_both_inputs_with_concurrent_writer() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::{mpsc, Arc};
        use std::time::Duration;

        let mut writer = DataWriteReference::new(AudioBuffer::filled(4, 0.5));
        let shared = writer.to_read_reference();

        let mut inputs = DataReferenceCollection::new();
        inputs.add_read_reference(INPUT_1, &shared);
        inputs.add_read_reference(INPUT_2, &shared);
        let mut operator =
            AudioAddOperator::create_operator(&BuildOperatorParams::new(settings(), inputs)).unwrap();
        assert_eq!(operator.output().read().as_slice(), &[1.0; 4]);

        let stop = Arc::new(AtomicBool::new(false));
        let writer_stop = Arc::clone(&stop);
        let writer_thread = std::thread::spawn(move || {
            let mut flip = false;
            while !writer_stop.load(Ordering::Relaxed) {
                flip = !flip;
                writer.set(AudioBuffer::filled(4, if flip { 1.0 } else { 0.5 }));
            }
        });

        let (done_tx, done_rx) = mpsc::channel();
        let output = operator.output();
        std::thread::spawn(move || {
            for _ in 0..200_000 {
                operator.execute();
            }
            let _ = done_tx.send(());
        });

        let finished = done_rx.recv_timeout(Duration::from_secs(20)).is_ok();
        stop.store(true, Ordering::Relaxed);
        assert!(finished, "execute blocked with both inputs on one slot");
        writer_thread.join().unwrap();

        let out = output.read();
        assert!(out.iter().all(|&x| x == out[0]));
        assert!(out[0] == 1.0 || out[0] == 2.0);
    }

    #[test]
    fn test_float_reference_rejected() {
        let wrong = DataWriteReference::new(1.0f32);
        let mut inputs = DataReferenceCollection::new();
        inputs.add_read_reference(INPUT_2, &wrong.to_read_reference());

        let errors = AudioAddOperator::create_operator(&BuildOperatorParams::new(settings(), inputs))
            .err()
            .unwrap();
        assert_eq!(errors.len(), 1);
    }
}
