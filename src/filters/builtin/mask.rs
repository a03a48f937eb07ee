//! Mask operators: arithmetic, component separation, block quantization.

use crate::core::context::ExecutionContext;
use crate::core::error::{ExecutionError, RegistryError};
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::port::{ParameterDefinition, PortDefinition};
use crate::core::types::{PortType, Value};
use crate::filters::builtin::{choice, get_usize};
use crate::filters::registry::FilterRegistry;
use crate::kernels::mask::{blockify_mask, combine_masks, separate_masks, MaskOp, SeparateMode};

const SOURCE: &str = "mask";

/// Register mask operators.
pub fn register(registry: &mut FilterRegistry) -> Result<(), RegistryError> {
    registry.register(SOURCE, || Box::new(MaskAnd))?;
    registry.register(SOURCE, || Box::new(MaskSub))?;
    registry.register(SOURCE, || Box::new(MaskAdd))?;
    registry.register(SOURCE, || Box::new(SeparateMasks))?;
    registry.register(SOURCE, || Box::new(BlockifyMask))?;
    Ok(())
}

fn binary_metadata(id: &str, name: &str, description: &str) -> NodeMetadata {
    NodeMetadata::builder(id, name)
        .category(Category::Mask)
        .description(description)
        .input(PortDefinition::input("mask1", PortType::Mask))
        .input(PortDefinition::input("mask2", PortType::Mask))
        .output(PortDefinition::output("mask", PortType::Mask))
        .tags(["mask", "arithmetic"])
        .build()
}

fn run_binary(ctx: &mut ExecutionContext, op: MaskOp) -> Result<(), ExecutionError> {
    let a = ctx.get_input_mask("mask1")?;
    let b = ctx.get_input_mask("mask2")?;
    let out = combine_masks(a, b, op)?;
    ctx.set_output_mask("mask", out)
}

/// Element-wise product of two masks.
#[derive(Debug, Clone)]
pub struct MaskAnd;

impl FilterNode for MaskAnd {
    fn metadata(&self) -> NodeMetadata {
        binary_metadata("MaskAnd_UTK", "Mask And (UTK)", "Intersection of two masks (product)")
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        run_binary(ctx, MaskOp::And)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

/// `clamp(mask1 − mask2, 0, 1)`.
#[derive(Debug, Clone)]
pub struct MaskSub;

impl FilterNode for MaskSub {
    fn metadata(&self) -> NodeMetadata {
        binary_metadata("MaskSub_UTK", "Mask Sub (UTK)", "Subtract the second mask from the first")
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        run_binary(ctx, MaskOp::Subtract)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

/// `clamp(mask1 + mask2, 0, 1)`.
#[derive(Debug, Clone)]
pub struct MaskAdd;

impl FilterNode for MaskAdd {
    fn metadata(&self) -> NodeMetadata {
        binary_metadata("MaskAdd_UTK", "Mask Add (UTK)", "Union of two masks (saturating sum)")
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        run_binary(ctx, MaskOp::Add)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

/// Split a mask into one mask per connected component.
#[derive(Debug, Clone)]
pub struct SeparateMasks;

impl FilterNode for SeparateMasks {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("SeparateMasks_UTK", "Separate Masks (UTK)")
            .category(Category::Mask)
            .description("Separate 8-connected regions into individual masks, ordered left to right")
            .input(PortDefinition::input("mask", PortType::Mask))
            .output(PortDefinition::output("mask", PortType::Mask))
            .parameter(
                ParameterDefinition::new("size_threshold_width", PortType::Integer, Value::Integer(256))
                    .with_range(0.0, 4096.0)
                    .with_description("Components narrower than this are dropped"),
            )
            .parameter(
                ParameterDefinition::new("size_threshold_height", PortType::Integer, Value::Integer(256))
                    .with_range(0.0, 4096.0)
                    .with_description("Components shorter than this are dropped"),
            )
            .parameter(ParameterDefinition::choice("mode", &SeparateMode::NAMES, "area"))
            .parameter(
                ParameterDefinition::new("max_poly_points", PortType::Integer, Value::Integer(8))
                    .with_range(3.0, 32.0)
                    .with_description("Vertex budget in convex_polygons mode"),
            )
            .tags(["mask", "segmentation", "components"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let mask = ctx.get_input_mask("mask")?;
        let min_w = get_usize(ctx, "size_threshold_width")?;
        let min_h = get_usize(ctx, "size_threshold_height")?;
        let mode = choice(ctx, "mode", SeparateMode::parse)?;
        let max_points = get_usize(ctx, "max_poly_points")?;

        let out = separate_masks(mask, min_w, min_h, mode, max_points)?;
        log::debug!("Separated mask into {} component(s)", out.batch());
        ctx.set_output_mask("mask", out)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

/// Average-pool a mask into square blocks and upsample it back.
#[derive(Debug, Clone)]
pub struct BlockifyMask;

impl FilterNode for BlockifyMask {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("BlockifyMask_UTK", "Blockify Mask (UTK)")
            .category(Category::Mask)
            .description("Quantize a mask into blocks of the given size")
            .input(PortDefinition::input("masks", PortType::Mask))
            .output(PortDefinition::output("mask", PortType::Mask))
            .parameter(
                ParameterDefinition::new("block_size", PortType::Integer, Value::Integer(16))
                    .with_range(1.0, 4096.0),
            )
            .parameter(
                ParameterDefinition::new("binarize", PortType::Boolean, Value::Boolean(true)).optional(),
            )
            .parameter(
                ParameterDefinition::new("threshold", PortType::Float, Value::Float(0.5))
                    .with_range(0.0, 1.0)
                    .with_step(0.01)
                    .optional(),
            )
            .tags(["mask", "pixelate"])
            .build()
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
        let masks = ctx.get_input_mask("masks")?;
        let block = get_usize(ctx, "block_size")?;
        let threshold = if ctx.get_bool("binarize")? {
            Some(ctx.get_float("threshold")? as f32)
        } else {
            None
        };
        let out = blockify_mask(masks, block, threshold)?;
        ctx.set_output_mask("mask", out)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{ExecutionError, KernelError};
    use crate::core::tensor::MaskTensor;
    use crate::execution::invoke::Invocation;
    use ndarray::Array3;

    fn mask(batch: usize, h: usize, w: usize, f: impl Fn(usize, usize, usize) -> f32) -> Value {
        Value::Mask(MaskTensor::new(Array3::from_shape_fn((batch, h, w), |(b, y, x)| f(b, y, x))).unwrap())
    }

    #[test]
    fn test_mask_and_is_product() {
        let a = mask(2, 4, 4, |b, y, _| if b == 0 { 0.5 } else { y as f32 / 4.0 });
        let b = mask(2, 4, 4, |_, _, x| x as f32 / 3.0);
        let out = Invocation::new(&MaskAnd)
            .with_input("mask1", a.clone())
            .with_input("mask2", b.clone())
            .run()
            .unwrap();

        let out = out.mask("mask").unwrap();
        assert_eq!(out.shape(), vec![2, 4, 4]);
        let (a, b) = (a.as_mask().unwrap().array().clone(), b.as_mask().unwrap().array().clone());
        for ((o, x), y) in out.array().iter().zip(a.iter()).zip(b.iter()) {
            assert!((o - x * y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_mask_and_rejects_mismatched_shapes() {
        let err = Invocation::new(&MaskAnd)
            .with_input("mask1", mask(2, 4, 4, |_, _, _| 1.0))
            .with_input("mask2", mask(2, 4, 5, |_, _, _| 1.0))
            .run()
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Kernel(KernelError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_sub_and_add_saturate() {
        let a = mask(1, 2, 2, |_, _, _| 0.75);
        let b = mask(1, 2, 2, |_, _, _| 0.5);

        let sub = Invocation::new(&MaskSub)
            .with_input("mask1", b.clone())
            .with_input("mask2", a.clone())
            .run()
            .unwrap();
        assert!(sub.mask("mask").unwrap().array().iter().all(|v| *v == 0.0));

        let add = Invocation::new(&MaskAdd).with_input("mask1", a).with_input("mask2", b).run().unwrap();
        assert!(add.mask("mask").unwrap().array().iter().all(|v| *v == 1.0));
    }

    #[test]
    fn test_separate_masks_orders_by_x() {
        // right blob is larger, left blob must still come first
        let m = mask(1, 8, 12, |_, y, x| if (1..3).contains(&x) && (1..3).contains(&y) || (6..11).contains(&x) { 1.0 } else { 0.0 });
        let out = Invocation::new(&SeparateMasks)
            .with_input("mask", m)
            .with_parameter("size_threshold_width", Value::Integer(1))
            .with_parameter("size_threshold_height", Value::Integer(1))
            .run()
            .unwrap();
        let out = out.mask("mask").unwrap();
        assert_eq!(out.batch(), 2);
        assert_eq!(out.frame(0)[[1, 1]], 1.0);
        assert_eq!(out.frame(0)[[0, 8]], 0.0);
        assert_eq!(out.frame(1)[[0, 8]], 1.0);
    }

    #[test]
    fn test_blockify_defaults_binarize() {
        let m = mask(1, 4, 4, |_, y, x| if y < 2 && x < 2 && (x + y) > 0 { 1.0 } else { 0.0 });
        let out = Invocation::new(&BlockifyMask)
            .with_input("masks", m)
            .with_parameter("block_size", Value::Integer(2))
            .run()
            .unwrap();
        let out = out.mask("mask").unwrap();
        // 3/4 coverage in the top-left block binarizes to 1
        assert_eq!(out.frame(0)[[0, 0]], 1.0);
        assert_eq!(out.frame(0)[[3, 3]], 0.0);
    }

    #[test]
    fn test_block_size_out_of_range_is_schema_error() {
        let err = Invocation::new(&BlockifyMask)
            .with_input("masks", mask(1, 2, 2, |_, _, _| 1.0))
            .with_parameter("block_size", Value::Integer(0))
            .run()
            .unwrap_err();
        assert!(err.is_schema_error());
    }
}
