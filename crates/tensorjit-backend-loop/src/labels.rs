use tensorjit::graph::OpKind;

pub(crate) const LABEL_LOOP_ELEMWISE: &str = "loop.elemwise";
pub(crate) const LABEL_LOOP_ELEMWISE_REFERENCE: &str = "loop.elemwise.reference";
pub(crate) const LABEL_LOOP_CAREDUCE: &str = "loop.careduce";
pub(crate) const LABEL_LOOP_SUM: &str = "loop.sum";
pub(crate) const LABEL_LOOP_DIMSHUFFLE: &str = "loop.dimshuffle";
pub(crate) const LABEL_LOOP_SOFTMAX: &str = "loop.softmax";
pub(crate) const LABEL_LOOP_LOG_SOFTMAX: &str = "loop.log_softmax";
pub(crate) const LABEL_LOOP_SOFTMAX_GRAD: &str = "loop.softmax_grad";
pub(crate) const LABEL_LOOP_ARGMAX: &str = "loop.argmax";
pub(crate) const LABEL_LOOP_REDUCE_AXIS: &str = "loop.reduce_axis";
pub(crate) const LABEL_LOOP_REDUCE_AXES: &str = "loop.reduce_axes";
pub(crate) const LABEL_LOOP_AXIS_APPLY: &str = "loop.axis_apply";

pub(crate) fn op_label(kind: OpKind) -> &'static str {
    match kind {
        OpKind::Elemwise => LABEL_LOOP_ELEMWISE,
        OpKind::CaReduce => LABEL_LOOP_CAREDUCE,
        OpKind::Sum => LABEL_LOOP_SUM,
        OpKind::DimShuffle => LABEL_LOOP_DIMSHUFFLE,
        OpKind::Softmax => LABEL_LOOP_SOFTMAX,
        OpKind::LogSoftmax => LABEL_LOOP_LOG_SOFTMAX,
        OpKind::SoftmaxGrad => LABEL_LOOP_SOFTMAX_GRAD,
        OpKind::Argmax => LABEL_LOOP_ARGMAX,
    }
}
